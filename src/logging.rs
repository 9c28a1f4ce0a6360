//! Subscriber setup for binaries and demos.
//!
//! The library only emits `tracing` events; nothing is printed unless the
//! host installs a subscriber. [`init`] is the one-liner for hosts that do
//! not have their own.
//!
//! - `RUST_LOG` filters as usual (default `tsu_http2=info`).
//! - `TSU_LOG_FORMAT=json` switches to one JSON object per line.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const DEFAULT_DIRECTIVES: &str = "tsu_http2=info";

/// Installs the global subscriber with [`DEFAULT_DIRECTIVES`].
///
/// Returns `false` if a subscriber was already installed.
pub fn init() -> bool {
    init_with_default(DEFAULT_DIRECTIVES)
}

/// Same as [`init`] with custom fallback directives for when `RUST_LOG` is
/// unset or invalid.
pub fn init_with_default(directives: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    let json = wants_json(std::env::var("TSU_LOG_FORMAT").ok().as_deref());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .try_init()
        .is_ok()
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_only_when_asked() {
        assert!(wants_json(Some("json")));
        assert!(wants_json(Some("JSON")));
        assert!(!wants_json(Some("pretty")));
        assert!(!wants_json(None));
    }

    #[test]
    fn second_init_reports_existing_subscriber() {
        init();
        assert!(!init());
    }
}
