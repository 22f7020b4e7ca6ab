pub mod api;
pub mod commands;
pub mod config;
pub mod model;
pub mod queue;
pub mod relay;
pub mod service;
pub mod store;
