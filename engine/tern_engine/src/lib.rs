//! Process and request lifecycle for the Tern runtime core.
//!
//! An [`Engine`] is built once per process: it owns the configuration and
//! the shared, read-only half of the runtime (persistent constants, the
//! startup function and class tables). Each hosting thread then creates a
//! [`Worker`], which owns everything that is mutated while scripts run:
//! its arena, the request overlay of the constant table, its timeout and
//! its locals-table cache.
//!
//! ```text
//! Engine::builder(config) ── startup ──► Engine
//!                                          │ worker()
//!                                          ▼
//!              Worker ── begin_request ──► Request ── end ──► RequestSummary
//! ```
//!
//! A request that fails with a request-fatal error (memory ceiling,
//! timeout, script fatal) is still ended cleanly: its frames have been
//! unwound by the time the error reaches the host, and `end` sweeps the
//! request constants, releases resources and shuts the arena down so the
//! next request on the same worker starts from a valid state.

mod config;
mod engine;
mod request;
mod worker;

use std::sync::Once;

pub use config::{parse_byte_size, ConfigError, EngineConfig, EngineConfigBuilder};
pub use engine::{Engine, EngineBuilder, EngineError};
pub use request::{Request, RequestSummary};
pub use worker::Worker;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Call this once at startup. Safe to call multiple times.
/// Enable with `RUST_LOG=tern_alloc=debug` or `RUST_LOG=tern_call=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
