pub mod cli;
pub mod load_config;
pub mod steps;
pub mod store;

pub use cli::{run, Cli, Commands};
