//! Logging setup. The core modules only ever call the `log` macros
//! (`info!`, `warn!`, `error!`, ...); this module is the one place that
//! decides where those lines end up, matching the "structured lines tagged
//! with source location" requirement (spec §7) via log4rs's pattern
//! encoder, which includes `{M}:{L}` (module path and line) by default in
//! the pattern used below.

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log::LevelFilter;

/// Initialize logging for the `recoverd` binary. Safe to call once at
/// process start; a second call returns an error that callers should
/// ignore (e.g. in tests that spin up multiple coordinators in one
/// process).
pub fn init(level: LevelFilter) -> anyhow::Result<()> {
    let encoder = PatternEncoder::new("{d(%Y-%m-%dT%H:%M:%S%.3f)} {l} [{M}:{L}] {m}{n}");
    let stdout = ConsoleAppender::builder().encoder(Box::new(encoder)).build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}
