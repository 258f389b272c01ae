//! Process-wide `tracing` subscriber.

use tracing::Level;

/// Install the fmt subscriber at the level named by `Settings.log.level`
/// (`PAWCHAT_LOG__LEVEL`). Unrecognised names fall back to `info`.
///
/// Lines omit the target; callers attach connection and message ids as
/// fields. A second call is a no-op.
pub fn init(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(parse_level(level))
        .with_target(false)
        .try_init();
}

pub(crate) fn parse_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}
