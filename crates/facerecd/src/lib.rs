//! facerecd — HTTP service that registers and recognizes faces.
//!
//! - `POST /register` stores the embedding of an uploaded photo under a name.
//! - `POST /recognize` finds the closest registered face within the match threshold.
//! - `GET /health` is a liveness probe.
//!
//! Embeddings come from the engine thread, which owns the ONNX models;
//! records live in an append-only SQLite table opened per request.

pub mod config;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::Config;
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use error::{ApiError, ApiResult};
pub use server::{build_router, run};
pub use state::AppState;
