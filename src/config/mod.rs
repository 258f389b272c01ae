//! Configuration loading.
//!
//! Values come from an optional `config/default.*` file, then from
//! `PAWCHAT_`-prefixed environment variables (`__` separates nested keys,
//! e.g. `PAWCHAT_SERVER__PORT=9000`). Anything left unset falls back to
//! `Settings::default()`.

mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BusBackend, BusSettings, HistorySettings, LogSettings, ServerSettings, Settings,
    StoreSettings,
};

/// Loads the configuration from the default file and environment variables
/// and merges it with default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("PAWCHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    let server = partial.server;
    let store = partial.store;
    let bus = partial.bus;
    let history = partial.history;
    let log = partial.log;

    Ok(Settings {
        server: ServerSettings {
            host: server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
            jwt_secret: server
                .as_ref()
                .and_then(|s| s.jwt_secret.clone())
                .unwrap_or(default.server.jwt_secret),
            max_connections: server
                .as_ref()
                .and_then(|s| s.max_connections)
                .unwrap_or(default.server.max_connections),
            handshake_timeout_secs: server
                .as_ref()
                .and_then(|s| s.handshake_timeout_secs)
                .unwrap_or(default.server.handshake_timeout_secs),
            outbound_buffer: server
                .as_ref()
                .and_then(|s| s.outbound_buffer)
                .unwrap_or(default.server.outbound_buffer),
        },
        store: StoreSettings {
            path: store
                .and_then(|s| s.path)
                .unwrap_or(default.store.path),
        },
        bus: BusSettings {
            backend: bus
                .as_ref()
                .and_then(|b| b.backend)
                .unwrap_or(default.bus.backend),
            redis_url: bus
                .as_ref()
                .and_then(|b| b.redis_url.clone())
                .unwrap_or(default.bus.redis_url),
            channel: bus
                .as_ref()
                .and_then(|b| b.channel.clone())
                .unwrap_or(default.bus.channel),
        },
        history: HistorySettings {
            limit: history
                .and_then(|h| h.limit)
                .unwrap_or(default.history.limit),
        },
        log: LogSettings {
            level: log.and_then(|l| l.level).unwrap_or(default.log.level),
        },
    })
}

#[cfg(test)]
mod tests;
