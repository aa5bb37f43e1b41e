pub mod api;
pub mod config;
pub mod control;
pub mod db;
pub mod error;
pub mod hardware;
pub mod measurement_cache;
pub mod store;
