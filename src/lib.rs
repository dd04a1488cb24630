pub mod config;
pub mod controllers;
pub mod errors;
pub mod init;
pub mod models;
pub mod monitoring;
pub mod services;
pub mod state_management;
pub mod utils;
