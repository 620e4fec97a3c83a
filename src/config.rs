use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub records: RecordsConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:4321".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordsConfig {
    /// JSON array of record objects.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    /// Top-level key prefix under which the year partitions live.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Cloudflare R2 account ID; selects the R2 endpoint.
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub path_style: Option<bool>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_namespace() -> String {
    "dbhack-untels".to_string()
}
fn default_region() -> String {
    "auto".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub base_url: String,
    #[serde(default = "default_id_param")]
    pub id_param: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum lookups in flight per search. `1` resolves sequentially.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_url(),
            id_param: default_id_param(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_registry_url() -> String {
    "https://intranet.untels.edu.pe/tramitevirtual/administrado/consultarcliente".to_string()
}
fn default_id_param() -> String {
    "nrodocumento".to_string()
}
fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SearchConfig {
    /// Also search storage for national-ID queries (across every partition).
    #[serde(default)]
    pub locate_national_ids: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        bail!("server.bind must not be empty");
    }

    if config.storage.bucket.trim().is_empty() {
        bail!("storage.bucket must not be empty");
    }

    if config.storage.namespace.trim_matches('/').is_empty() {
        bail!("storage.namespace must not be empty");
    }

    if config.storage.endpoint_url.is_some() && config.storage.account_id.is_some() {
        bail!("storage.endpoint_url and storage.account_id are mutually exclusive");
    }

    if config.storage.timeout_secs == 0 || config.registry.timeout_secs == 0 {
        bail!("timeout_secs must be > 0");
    }

    if config.registry.concurrency == 0 {
        bail!("registry.concurrency must be >= 1");
    }

    if config.registry.id_param.trim().is_empty() {
        bail!("registry.id_param must not be empty");
    }

    Ok(())
}
