//! facetagd — HTTP face identity service.
//!
//! Accepts webcam frames plus client-side face detections and answers with
//! session-stable identity labels.

pub mod api;
pub mod config;
pub mod frame;
pub mod state;

pub use config::Config;
pub use state::AppState;
