use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ca: CaConfig,
    #[serde(default)]
    pub form_defaults: FormDefaults,
    #[serde(default)]
    pub ca_bootstrap: CaBootstrap,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub tls_key_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ServerConfig {
    /// Both halves of the TLS identity, if HTTPS is configured
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaConfig {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_openssl_binary")]
    pub openssl_binary: PathBuf,
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
    #[serde(default = "default_password_length")]
    pub password_length: usize,
    #[serde(default = "default_req_extensions")]
    pub req_extensions: String,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            openssl_binary: default_openssl_binary(),
            key_bits: default_key_bits(),
            password_length: default_password_length(),
            req_extensions: default_req_extensions(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("ca")
}

fn default_openssl_binary() -> PathBuf {
    PathBuf::from("openssl")
}

fn default_key_bits() -> u32 {
    2048
}

fn default_password_length() -> usize {
    8
}

fn default_req_extensions() -> String {
    "server".to_string()
}

/// Values the creation form is prefilled with
#[derive(Debug, Deserialize, Clone)]
pub struct FormDefaults {
    #[serde(default = "default_common_name")]
    pub common_name: String,
    #[serde(default = "default_email")]
    pub email: String,
    #[serde(default = "default_organization")]
    pub organization: String,
    #[serde(default = "default_organizational_unit")]
    pub organizational_unit: String,
    #[serde(default = "default_locality")]
    pub locality: String,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_days_valid")]
    pub days_valid: u32,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            common_name: default_common_name(),
            email: default_email(),
            organization: default_organization(),
            organizational_unit: default_organizational_unit(),
            locality: default_locality(),
            state: default_state(),
            country: default_country(),
            days_valid: default_days_valid(),
        }
    }
}

fn default_common_name() -> String {
    "Max_Mustermann_2015".to_string()
}

fn default_email() -> String {
    "max@mustermann.de".to_string()
}

fn default_organization() -> String {
    "Nonesense GmbH".to_string()
}

fn default_organizational_unit() -> String {
    "R&D".to_string()
}

fn default_locality() -> String {
    "Buxtehude".to_string()
}

fn default_state() -> String {
    "Niedersachsen".to_string()
}

fn default_country() -> String {
    "DE".to_string()
}

fn default_days_valid() -> u32 {
    365
}

/// Subject of the self-signed CA created by `setup --bootstrap-ca`
#[derive(Debug, Deserialize, Clone)]
pub struct CaBootstrap {
    #[serde(default = "default_ca_common_name")]
    pub common_name: String,
    #[serde(default = "default_ca_organization")]
    pub organization: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_ca_validity")]
    pub validity_days: u32,
    #[serde(default = "default_ca_key_bits")]
    pub key_bits: u32,
}

impl Default for CaBootstrap {
    fn default() -> Self {
        Self {
            common_name: default_ca_common_name(),
            organization: default_ca_organization(),
            country: default_country(),
            validity_days: default_ca_validity(),
            key_bits: default_ca_key_bits(),
        }
    }
}

fn default_ca_common_name() -> String {
    "Web CA Root".to_string()
}

fn default_ca_organization() -> String {
    "Web CA".to_string()
}

fn default_ca_validity() -> u32 {
    3650 // 10 years
}

fn default_ca_key_bits() -> u32 {
    4096
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).context("Failed to parse config file")
    }

    /// Like [`AppConfig::from_file`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }
}
