pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ids;
pub mod model;
pub mod persist;
pub mod reaper;
pub mod repository;
pub mod scheduler;
pub mod server;
pub mod state_machine;
