use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_REGION: &str = "us-west-1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PailConfig {
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    S3,
    Local,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "local" => Ok(Self::Local),
            other => anyhow::bail!("Unknown backend: {} (expected s3 or local)", other),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub s3: S3Settings,

    #[serde(default)]
    pub local: LocalSettings,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct S3Settings {
    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for S3-compatible services (MinIO, LocalStack)
    #[serde(default)]
    pub endpoint_url: Option<String>,

    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            access_key_id: None,
            secret_access_key: None,
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl S3Settings {
    /// Overlay the standard AWS environment variables onto these settings
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = lookup("AWS_ACCESS_KEY_ID") {
            self.access_key_id = Some(v);
        }
        if let Some(v) = lookup("AWS_SECRET_ACCESS_KEY") {
            self.secret_access_key = Some(v);
        }
        if let Some(v) = lookup("AWS_REGION") {
            self.region = v;
        }
        if let Some(v) = lookup("AWS_ENDPOINT_URL") {
            self.endpoint_url = Some(v);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Directory whose subdirectories are served as buckets
    #[serde(default = "default_local_root")]
    pub root: PathBuf,
}

fn default_local_root() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            root: default_local_root(),
        }
    }
}

impl PailConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Self::default()
        };

        config.storage.s3.apply_env();

        Ok(config)
    }
}
