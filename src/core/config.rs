use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub delivery: DeliveryConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the stored video files. Created at startup if missing.
    pub video_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Cap on the whole multipart request body.
    pub max_upload_size_bytes: u64,
    /// When false, uploading onto an existing filename is rejected with 409.
    pub allow_overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// `Content-Type` sent with every streamed body.
    pub content_type: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            video_dir: PathBuf::from("./videos"),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size_bytes: 32 * 1024 * 1024, // 32 MiB
            allow_overwrite: true,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            content_type: "video/mp4".to_string(),
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration with layered overrides:
    /// 1. built-in defaults
    /// 2. config/default.toml (if present)
    /// 3. config/{env}.toml (based on VIDSTREAM_ENV, if present)
    /// 4. Environment variables (VIDSTREAM_* prefix)
    pub fn load() -> anyhow::Result<Self> {
        let env_name =
            std::env::var("VIDSTREAM_ENV").unwrap_or_else(|_| "development".to_string());
        Self::load_from(Path::new("config"), &env_name, |key| std::env::var(key).ok())
    }

    /// Layered load rooted at `dir`. Keys missing from `{env_name}.toml` keep
    /// the value from `default.toml`, and keys missing from both keep the
    /// built-in default.
    pub fn load_from(
        dir: &Path,
        env_name: &str,
        var: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut merged = toml::Table::new();
        for path in [
            dir.join("default.toml"),
            dir.join(format!("{}.toml", env_name)),
        ] {
            if let Some(layer) = Self::read_file(&path)? {
                merge_tables(&mut merged, layer);
            }
        }

        let mut config: AppConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

        Self::apply_env_overrides(&mut config, var);

        Ok(config)
    }

    /// Parse a TOML config file into a raw table. A missing file is not an error.
    fn read_file(path: &Path) -> anyhow::Result<Option<toml::Table>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                ))
            }
        };
        toml::from_str(&content)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env_overrides(config: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("VIDSTREAM_SERVER_HOST") {
            config.server.host = v;
        }
        if let Some(v) = var("VIDSTREAM_SERVER_PORT") {
            if let Ok(port) = v.parse() {
                config.server.port = port;
            }
        }
        if let Some(v) = var("VIDSTREAM_STORAGE_VIDEO_DIR") {
            config.storage.video_dir = PathBuf::from(v);
        }
        if let Some(v) = var("VIDSTREAM_UPLOAD_MAX_BYTES") {
            if let Ok(max) = v.parse() {
                config.upload.max_upload_size_bytes = max;
            }
        }
        if let Some(v) = var("VIDSTREAM_UPLOAD_ALLOW_OVERWRITE") {
            if let Ok(allow) = v.parse() {
                config.upload.allow_overwrite = allow;
            }
        }
        if let Some(v) = var("VIDSTREAM_OBSERVABILITY_LOG_LEVEL") {
            config.observability.log_level = v;
        }
    }
}

/// Overlay `layer` onto `base`, descending into nested tables.
fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match value {
            toml::Value::Table(section) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, section);
                } else {
                    base.insert(key, toml::Value::Table(section));
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}
