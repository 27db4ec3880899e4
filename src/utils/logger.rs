use anyhow::{Context, Result};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, registry};

/// Installs the global console logger at INFO.
pub fn init_logger() -> Result<()> {
    let filter = Targets::new().with_default(Level::INFO);

    let std_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);

    let registry = registry().with(std_layer).with(filter);

    set_global_default(registry).context("Failed to install global logger")
}
