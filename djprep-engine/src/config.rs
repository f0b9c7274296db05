//! Engine configuration: CLI flags override a TOML file, which overrides
//! compiled defaults. The data directory additionally
//! supports a `DATA_DIR` environment override ahead of the TOML file,
//! matching djprep-common's data-dir resolution tier.

use djprep_common::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TomlConfig {
    pub http_port: Option<u16>,
    pub rpc_port: Option<u16>,
    pub analyzer_addr: Option<String>,
    pub log_level: Option<String>,
    pub auth: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub http_port: u16,
    pub rpc_port: u16,
    pub analyzer_addr: String,
    pub log_level: String,
    pub auth: bool,
}

impl Config {
    const DEFAULT_HTTP_PORT: u16 = 8080;
    const DEFAULT_RPC_PORT: u16 = 50051;
    const DEFAULT_ANALYZER_ADDR: &'static str = "127.0.0.1:50061";
    const DEFAULT_LOG_LEVEL: &'static str = "info";

    /// Resolve the effective configuration. `cli` fields take priority;
    /// anything left `None` falls through to `engine.toml` inside
    /// `data_dir`, then to the compiled defaults above.
    pub async fn load(cli: &CliOverrides) -> Result<Self> {
        let data_dir =
            djprep_common::config::resolve_data_dir(cli.data_dir.as_deref(), "DATA_DIR")?;

        let toml_path = data_dir.join("engine.toml");
        let toml_config = load_toml_config(&toml_path).unwrap_or_default();

        Ok(Self {
            data_dir,
            http_port: cli
                .http_port
                .or(toml_config.http_port)
                .unwrap_or(Self::DEFAULT_HTTP_PORT),
            rpc_port: cli
                .rpc_port
                .or(toml_config.rpc_port)
                .unwrap_or(Self::DEFAULT_RPC_PORT),
            analyzer_addr: cli
                .analyzer_addr
                .clone()
                .or(toml_config.analyzer_addr)
                .unwrap_or_else(|| Self::DEFAULT_ANALYZER_ADDR.to_string()),
            log_level: cli
                .log_level
                .clone()
                .or(toml_config.log_level)
                .unwrap_or_else(|| Self::DEFAULT_LOG_LEVEL.to_string()),
            auth: cli.auth || toml_config.auth.unwrap_or(false),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("store.db")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }
}

/// CLI overrides for `Config::load`, built directly from `clap::Parser`
/// in `main.rs` rather than re-declared here.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub data_dir: Option<String>,
    pub http_port: Option<u16>,
    pub rpc_port: Option<u16>,
    pub analyzer_addr: Option<String>,
    pub log_level: Option<String>,
    pub auth: bool,
}

fn load_toml_config(path: &Path) -> Option<TomlConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cli_overrides_win_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cli = CliOverrides {
            data_dir: Some(dir.path().to_string_lossy().to_string()),
            http_port: Some(9999),
            ..Default::default()
        };
        let config = Config::load(&cli).await.unwrap();
        assert_eq!(config.http_port, 9999);
        assert_eq!(config.rpc_port, Config::DEFAULT_RPC_PORT);
    }

    #[tokio::test]
    async fn toml_file_fills_in_unset_cli_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("engine.toml"),
            "http_port = 7000\nauth = true\n",
        )
        .unwrap();
        let cli = CliOverrides {
            data_dir: Some(dir.path().to_string_lossy().to_string()),
            ..Default::default()
        };
        let config = Config::load(&cli).await.unwrap();
        assert_eq!(config.http_port, 7000);
        assert!(config.auth);
    }
}
