//! Log output for the `tgn` binary.
//!
//! The sender reports skipped sends at `debug` and failed deliveries at
//! `warn`. Libraries embedding `tgn-core` bring their own subscriber; the CLI
//! installs one here.

use crate::Result;

/// Install a stderr fmt subscriber for `service_name` (needs the `subscriber`
/// feature; otherwise events go to whatever subscriber is already set, if any).
///
/// `RUST_LOG` overrides the default filter.
pub fn init(service_name: &str) -> Result<()> {
    #[cfg(feature = "subscriber")]
    {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "warn,tgn_core=info,tgn_telegram=info,{service_name}=info"
            ))
        });

        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    #[cfg(not(feature = "subscriber"))]
    let _ = service_name;

    Ok(())
}
