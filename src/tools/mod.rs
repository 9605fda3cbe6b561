pub mod code_sandbox;
pub mod registry;
pub mod sandbox;
