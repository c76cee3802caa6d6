//! Server infrastructure for the loyalty ledger
//!
//! This crate owns the HTTP listener lifecycle and the shutdown signal that
//! the API server and the reconciliation worker share.
//!
//! # Architecture
//!
//! [`HttpServer`] implements the [`Server`] trait, which gives a consistent
//! interface for running and monitoring a listener. The [`ServerExt`] trait
//! adds `spawn()`. Every [`HttpServer`] also serves `GET /health`.
//!
//! Shutdown is coordinated through [`ShutdownController`], which hands out
//! child [`CancellationToken`](tokio_util::sync::CancellationToken)s to every
//! long-running component.
//!
//! # Example
//!
//! ```ignore
//! use server::{HttpServer, ServerConfig, Server, ShutdownController};
//!
//! let shutdown = ShutdownController::with_signals();
//! let config = ServerConfig::from_address("localhost:8080")?;
//! let server = HttpServer::new(config, router);
//! server.run(shutdown.child_token()).await?;
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod shutdown;
pub mod traits;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use health::simple_health_handler;
pub use http::HttpServer;
pub use shutdown::{drain_with_timeout, run_until_shutdown, ShutdownController};
pub use traits::{Server, ServerExt};
