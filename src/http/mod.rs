//! HTTP API server for the consultation UI
//!
//! This module provides a REST API for controlling the voice session:
//! - POST /voice/session/start - Start a consultation
//! - POST /voice/session/stop - End the consultation
//! - GET /voice/session/status - Observable state for rendering
//! - GET /voice/session/transcript - Finalized conversation log
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
