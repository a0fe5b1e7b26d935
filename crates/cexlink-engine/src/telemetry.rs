/*
[INPUT]:  Log level or EnvFilter directive string
[OUTPUT]: Process-wide tracing subscriber
[POS]:    Telemetry layer - logging bootstrap for embedding applications
[UPDATE]: When changing log output format or filtering
*/

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `level` accepts plain levels ("info")
/// or full directives ("cexlink_adapter=debug,warn").
pub fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}
