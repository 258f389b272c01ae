use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub bus: BusSettings,
    pub history: HistorySettings,
    pub log: LogSettings,
}

/// Listener and per-connection limits.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub max_connections: usize,
    pub handshake_timeout_secs: u64,
    pub outbound_buffer: usize,
}

/// Location of the sled database holding messages and users.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub path: String,
}

/// Which fanout backend to use.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    Local,
    Redis,
}

/// Fanout bus connection parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct BusSettings {
    pub backend: BusBackend,
    pub redis_url: String,
    pub channel: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistorySettings {
    pub limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub store: Option<PartialStoreSettings>,
    pub bus: Option<PartialBusSettings>,
    pub history: Option<PartialHistorySettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub jwt_secret: Option<String>,
    pub max_connections: Option<usize>,
    pub handshake_timeout_secs: Option<u64>,
    pub outbound_buffer: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialStoreSettings {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBusSettings {
    pub backend: Option<BusBackend>,
    pub redis_url: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialHistorySettings {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                jwt_secret: "change-me".to_string(),
                max_connections: 1000,
                handshake_timeout_secs: 30,
                outbound_buffer: 256,
            },
            store: StoreSettings {
                path: "pawchat_db".to_string(),
            },
            bus: BusSettings {
                backend: BusBackend::Local,
                redis_url: "redis://127.0.0.1:6379".to_string(),
                channel: "chat".to_string(),
            },
            history: HistorySettings { limit: 50 },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
