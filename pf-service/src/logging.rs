//! Structured logging setup (§2 ambient stack).
//!
//! `tracing-subscriber`'s `EnvFilter` reads `RUST_LOG`, defaulting to
//! `info`, and each subsystem logs under its own `target` (`pf::auth`,
//! `pf::worker`, `pf::cleanup`, `pf::errors`, ...) the way the data
//! extension worker logs under `target: "data-extension-worker"`.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}
