//! ABOUTME: Tracing subscriber setup shared by the binary and tests
//! ABOUTME: Pretty output for local runs, JSON lines in production

use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Output format of the log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `production` logs JSON; every other environment gets the pretty formatter
    pub fn for_environment(env: &str) -> Self {
        if env.eq_ignore_ascii_case("production") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Initialize tracing - safe to call multiple times
///
/// Worker threads are told apart by name in every line.
pub fn init_tracing(env: &str, service: &str) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let format = LogFormat::for_environment(env);

        let registry = tracing_subscriber::registry().with(env_filter);
        match format {
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().with_thread_names(true))
                .init(),
            LogFormat::Pretty => registry
                .with(tracing_subscriber::fmt::layer().pretty().with_thread_names(true))
                .init(),
        }

        tracing::info!(service = %service, env = %env, ?format, "Tracing initialized");
    });
}
