// VPSight - Core Library
// Server records, billing-cycle engine and admin plumbing shared by the CLI,
// the terminal dashboard and the web server

pub mod acknowledgment;
pub mod auth;
pub mod config;
pub mod cycle;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod expiry;
pub mod forms;
pub mod renewal;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "tui")]
pub mod ui;

use std::sync::Once;

// Re-export commonly used types
pub use acknowledgment::{AckState, RenewalAcknowledgment, RenewalTicket};
pub use config::AppConfig;
pub use cycle::{parse_cycle, CycleLength, CycleWindow};
pub use dashboard::{BillingStatus, DashboardRow};
pub use db::{Column, FieldChanges, NewVpsInstance, RecordStore, SqliteStore, TrafficType, VpsInstance};
pub use error::RenewalError;
pub use expiry::{compute_expiry, compute_progress, Clock, DaysRemaining, FixedClock, Progress, Severity, SystemClock};
pub use forms::{ServerForm, ValidationError};
pub use renewal::{Renewal, RenewalEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static TRACING_INIT: Once = Once::new();

/// Install the global subscriber once. `RUST_LOG` overrides `default_directive`.
pub fn init_tracing(default_directive: &str) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        // Another subscriber may already be installed (tests, embedding apps)
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
