//! Process-wide logging setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "sniff_engine=info,sniff_protocol=info,sniff_sim=info";

/// Install the fmt subscriber and log the driver version
///
/// Call once at startup. Returns `false` if a global subscriber was already
/// installed, in which case nothing changes.
pub fn init() -> bool {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("BLE sniffer host driver {}", env!("CARGO_PKG_VERSION"));
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init();
        assert!(!init());
    }
}
