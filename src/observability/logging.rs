use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured JSON logging to stdout with contextual fields.
/// `default_filter` applies when `RUST_LOG` is not set (normally the
/// `log_filter` value from `Settings`).
pub fn init_logging(default_filter: &str) -> anyhow::Result<()> {
	let env_filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(default_filter))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	let json_layer = tracing_subscriber::fmt::layer()
		.json()
		.with_target(true)
		.with_level(true)
		.with_file(true)
		.with_line_number(true);

	tracing_subscriber::registry()
		.with(env_filter)
		.with(json_layer)
		.try_init()
		.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

	Ok(())
}
