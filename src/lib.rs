pub mod analytics;
pub mod auth;
pub mod buffer;
pub mod cache;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod handlers;
pub mod lifecycle;
pub mod limiter;
pub mod middleware;
pub mod server;
pub mod types;

#[cfg(test)]
pub mod testing;
