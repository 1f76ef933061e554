//! Langdetect Server
//!
//! HTTP front end for the CLD3 language classification engine. Detection
//! runs on the server when the engine loaded at startup; otherwise requests
//! are deferred to the interactive page, which runs the same engine in the
//! browser.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod static_files;

pub use app::{build_app, run_server};
pub use cli::Cli;
pub use config::ServiceConfig;
pub use error::AppError;
pub use state::AppState;
