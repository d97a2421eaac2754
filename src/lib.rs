//! # LP Experiment Server
//!
//! An HTTP service for landing-page A/B experiments: per-session variant
//! assignment, client-side event tracking, and conversion significance
//! analysis.
//!
//! ## Features
//!
//! - **Variant Assignment**: stable per-session 50/50 bucketing per testable
//!   component, with explicit URL overrides
//! - **Event Tracking**: append-only pageview/view/click/conversion/scroll/
//!   exit events with best-effort denormalized counters
//! - **Significance Analysis**: two-proportion z-test confidence with fixed
//!   sample and improvement gates, recomputed from the raw event log
//! - **Winner Application**: explicit one-way promotion of the winning
//!   variant's content
//! - **Variant Drafting**: optional LLM-backed challenger generation
//!
//! ## Architecture
//!
//! ```text
//! Browser -> REST API (axum) -> Assigner / Recorder / Evaluator
//!                   |
//!              SQLite (sessions, events, stats, results)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lp_experiments::{build_router, AppState, Config};
//! use lp_experiments::storage::{SqliteStorage, Storage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage: Arc<dyn Storage> =
//!         Arc::new(SqliteStorage::new(&config.database).await?);
//!     let (state, _worker) = AppState::new(config.clone(), storage, None);
//!     let app = build_router(Arc::new(state));
//!     let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Significance evaluation and test-result reporting.
pub mod analysis;
/// Variant assignment with override handling.
pub mod assign;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Variant-drafting API client.
pub mod generate;
/// System prompts for the drafting API.
pub mod prompts;
/// HTTP server, router, and handlers.
pub mod server;
/// SQLite storage layer and domain types.
pub mod storage;
/// Event recording and the beacon queue.
pub mod tracking;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{build_router, AppState, SharedState};
