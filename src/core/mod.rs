pub mod agent_loop;
pub mod config;
pub mod error;
pub mod model_runner;
pub mod opening_remarks;
pub mod output_parser;
pub mod prompt;
pub mod schemas;
pub mod utils;
