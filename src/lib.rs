//! # kvedge
//!
//! A key-value HTTP service whose reads are served cache-aside and whose
//! writes pass a per-client rate limit. Storage, caching and rate limiting
//! are injected capabilities ([`KvStore`], [`ResponseCache`],
//! [`RateLimiter`]); in-memory backends ship with the crate.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kvedge::{App, AppState, Config, Request, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let app = Arc::new(App::new(AppState::in_memory(&config)));
//!     let server = Server::bind(config.bind_addr()).await?;
//!     server
//!         .run(move |req: Request| {
//!             let app = Arc::clone(&app);
//!             async move { app.handle(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod background;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;
pub mod store;

pub use app::{App, AppState};
pub use cache::ResponseCache;
pub use config::Config;
pub use error::AppError;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use security::RateLimiter;
pub use server::{Server, ServerError};
pub use store::KvStore;
