pub mod backend;
pub mod config;
pub mod file_system;
pub mod logger;
pub mod output;
