//! Fireline Fusion: wildfire sensor fusion and mission dispatch platform.
//!
//! - **Triangulation**: bearing-only localization of smoke/fire detections
//! - **Risk**: heuristic and trained fire-danger scoring over environmental cells
//! - **Spread**: stochastic cellular-automaton fire growth simulation
//! - **Bus / Track / Dispatch**: in-process event fanout, per-source track
//!   correlation, and mission lifecycle management
//! - **Store**: pluggable persistence (in-memory or Postgres)
//! - **Stream**: live websocket event feed for operator UIs

pub mod api;
pub mod bus;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod geo;
pub mod models;
pub mod risk;
pub mod spread;
pub mod store;
pub mod stream;
pub mod track;
pub mod triangulation;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
