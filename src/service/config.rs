extern crate config as _;

use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

pub static GLOBAL_CONFIG: OnceCell<RelayConfig> = OnceCell::new();
pub fn global_config() -> &'static RelayConfig {
    GLOBAL_CONFIG.get().unwrap()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    /// directory the HTTPS listener serves files from
    pub static_root: String,
    /// document served for `GET /`
    pub default_document: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            static_root: "web".to_string(),
            default_document: "device-share.html".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    pub ip: String,
    pub http_port: u16,
    pub ws_port: u16,
    pub max_connection: usize,
    pub tls_cert: String,
    pub tls_key: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "0.0.0.0".to_string(),
            http_port: 8080,
            ws_port: 8001,
            max_connection: 100,
            tls_cert: "server.crt".to_string(),
            tls_key: "server.key".to_string(),
        }
    }
}

/// Capacities of the two ingest rings and the per-slot payload limit.
///
/// The slot counts are deployment knobs, not derived from the frame size:
/// audio arrives more often than video, so it gets the deeper ring.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IngestConfig {
    pub audio_slots: usize,
    pub video_slots: usize,
    /// maximum payload accepted into a slot, larger frames are dropped
    pub max_frame_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            audio_slots: 10,
            video_slots: 3,
            max_frame_size: 64 * 1024,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct RelayConfig {
    pub general: GeneralConfig,
    pub network: NetworkConfig,
    pub ingest: IngestConfig,
}

impl RelayConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<RelayConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let relay_config: RelayConfig = config.try_deserialize()?;

        Ok(relay_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = RelayConfig::default();
        assert_eq!(config.network.http_port, 8080);
        assert_eq!(config.network.ws_port, 8001);
        assert_eq!(config.ingest.audio_slots, 10);
        assert_eq!(config.ingest.video_slots, 3);
        assert_eq!(config.ingest.max_frame_size, 65536);
        assert_eq!(config.general.default_document, "device-share.html");
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
            [general]
            static_root = "static"
            default_document = "index.html"

            [network]
            ip = "127.0.0.1"
            http_port = 9443
            ws_port = 9001
            max_connection = 8
            tls_cert = "certs/relay.crt"
            tls_key = "certs/relay.key"

            [ingest]
            audio_slots = 4
            video_slots = 2
            max_frame_size = 1024
            "#
        )
        .unwrap();

        let config = RelayConfig::set_up_config(&path).unwrap();
        assert_eq!(config.general.static_root, "static");
        assert_eq!(config.network.http_port, 9443);
        assert_eq!(config.network.max_connection, 8);
        assert_eq!(config.ingest.audio_slots, 4);
        assert_eq!(config.ingest.max_frame_size, 1024);
    }
}
