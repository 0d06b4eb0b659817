use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "ledger_core=info,ledger_store=info,ledger=info";

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Only the first call has any effect.
pub fn init(default_filter: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
	static INIT: Once = Once::new();
	let mut result = Ok(());

	INIT.call_once(|| {
		if let Err(e) = tracing_subscriber::registry()
			.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
			.with(
				fmt::layer()
					.with_target(true)
					.with_writer(std::io::stderr),
			)
			.try_init()
		{
			result = Err(format!("Failed to initialize tracing: {e}").into());
		}
	});

	result
}
