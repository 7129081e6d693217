mod config;
pub mod metrics;
pub mod server;
pub mod state;

pub use config::ServerConfig;
#[allow(unused_imports)] // Used by main.rs
pub use server::{make_app, run_server};
