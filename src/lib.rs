pub mod config;
pub mod error;
pub mod health;
pub mod info;
pub mod provision;
pub mod repository;
pub mod server;
pub mod store;
