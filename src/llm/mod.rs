pub mod api_types;
pub mod client;
