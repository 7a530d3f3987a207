//! Tracing setup with a runtime-adjustable filter.
//!
//! The default filter keeps the REPL quiet (warnings only, or whatever
//! `RUST_LOG` says); `/debug on` swaps in a debug-level filter without
//! restarting.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt, reload};

/// Handle for adjusting log verbosity at runtime
pub struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    debug: bool,
}

impl LogControl {
    pub fn set_debug(&mut self, enabled: bool) {
        let filter = if enabled {
            EnvFilter::new("debug")
        } else {
            default_filter()
        };
        if let Err(err) = self.handle.reload(filter) {
            eprintln!("[warning] failed to adjust log filter: {err}");
            return;
        }
        self.debug = enabled;
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Initialize the global subscriber; call once at startup
pub fn init() -> LogControl {
    let (filter, handle) = reload::Layer::new(default_filter());
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
    LogControl {
        handle,
        debug: false,
    }
}
