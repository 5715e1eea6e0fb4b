//! Command handlers, one module per subcommand group

pub mod chunks;
pub mod config;
pub mod features;
pub mod generate;
pub mod models;
