pub mod chain;
pub mod cli;
pub mod config;
pub mod evaluator;
pub mod fork_db;
pub mod logging;
pub mod state;
pub mod storage;
pub mod types;
pub mod utilities;
