// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Opt-in diagnostics for the preloaded library.
//!
//! The library runs inside arbitrary host processes, so nothing is printed
//! unless `EAR_LOG` holds an `EnvFilter` directive (`EAR_LOG=ear=debug`).
//! Events go to stderr. A host that already installed a global subscriber
//! keeps it.

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for the library's own diagnostics.
pub const ENV_LOG: &str = "EAR_LOG";

static LOGGING: OnceCell<()> = OnceCell::new();

/// Install the stderr subscriber once, if `EAR_LOG` asks for one.
pub fn init() {
    LOGGING.get_or_init(|| {
        let Some(filter) = filter_from(std::env::var(ENV_LOG).ok().as_deref()) else {
            return;
        };
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(false);
        let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
    });
}

/// `None` keeps the library silent: the variable is unset, empty, or not a
/// valid directive.
fn filter_from(value: Option<&str>) -> Option<EnvFilter> {
    match value.map(str::trim) {
        None | Some("") => None,
        Some(directives) => EnvFilter::try_new(directives).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_is_off_unless_requested() {
        assert!(filter_from(None).is_none());
        assert!(filter_from(Some("")).is_none());
        assert!(filter_from(Some("  ")).is_none());
    }

    #[test]
    fn directives_are_parsed_as_env_filter() {
        assert!(filter_from(Some("debug")).is_some());
        assert!(filter_from(Some("ear=trace,warn")).is_some());
        assert!(filter_from(Some("ear=loudest")).is_none());
    }
}
