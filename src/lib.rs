pub mod accounts;
pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod mediator;
pub mod middleware;
pub mod policy;
pub mod resources;
pub mod schema;
pub mod store;
pub mod types;
