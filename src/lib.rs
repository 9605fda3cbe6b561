pub mod channels;
pub mod core;
pub mod llm;
pub mod server;
pub mod store;
pub mod tape;
pub mod tools;
