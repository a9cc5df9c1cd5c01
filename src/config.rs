//! Configuration management for phishhunter
//!
//! Configuration is read from `./config/phishhunter.toml` (or a path given on
//! the command line). The template embedded below is the single source of
//! defaults and is used as-is when no file exists.

use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/phishhunter.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/phishhunter.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' must be greater than zero")]
    ZeroValue { field: String },

    #[error("Configuration field '{field}' is out of range: {value}")]
    OutOfRange { field: String, value: f64 },

    #[error("Invalid address in '{field}': {address} (expected ip:port format)")]
    InvalidAddress { field: String, address: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub dns: DnsConfig,
    pub whois: WhoisConfig,
    pub http: HttpConfig,
    pub browser: BrowserConfig,
    pub visual: VisualConfig,
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// DNS resolution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    pub timeout_secs: u64,
    #[serde(default = "default_dns_attempts")]
    pub attempts: usize,
    /// Explicit `ip:port` name servers; empty means the system configuration.
    #[serde(default)]
    pub name_servers: Vec<String>,
}

fn default_dns_attempts() -> usize {
    2
}

/// WHOIS lookup configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WhoisConfig {
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub system_fallback: bool,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_max_redirects() -> usize {
    10
}

/// Headless browser configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub page_load_timeout_secs: u64,
    pub screenshot_dir: PathBuf,
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
}

/// Visual similarity configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VisualConfig {
    pub ssim_threshold: f64,
    #[serde(default = "default_template_threshold")]
    pub template_threshold: f64,
    #[serde(default = "default_true")]
    pub ocr_enabled: bool,
    #[serde(default)]
    pub brands: Vec<BrandConfig>,
}

fn default_template_threshold() -> f64 {
    0.8
}

/// A brand commonly impersonated by phishing pages
#[derive(Debug, Clone, Deserialize)]
pub struct BrandConfig {
    pub name: String,
    /// Registrable domains the brand legitimately serves from
    pub domains: Vec<String>,
    /// Lowercase phrases that identify the brand in OCR text
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Screenshot of the genuine login page
    #[serde(default)]
    pub reference_image: Option<PathBuf>,
    /// Cropped logo used for template matching
    #[serde(default)]
    pub logo: Option<PathBuf>,
}

impl BrandConfig {
    /// True when `root_domain` is one of the brand's own domains.
    pub fn owns(&self, root_domain: &str) -> bool {
        self.domains.iter().any(|d| {
            let d = d.to_lowercase();
            root_domain == d || root_domain.ends_with(&format!(".{}", d))
        })
    }
}

/// Classifier model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
}

/// Batch processing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub request_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { request_delay_ms: 100 }
    }
}

fn default_true() -> bool {
    true
}

impl DnsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl WhoisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BrowserConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from the default path, falling back to the
    /// embedded template when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::load_from_path(Path::new(CONFIG_PATH)) {
            Err(ConfigError::FileNotFound(_)) => Self::embedded(),
            other => other,
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// The embedded default configuration
    pub fn embedded() -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "http.user_agent".to_string(),
            });
        }

        let timeouts = [
            ("dns.timeout_secs", self.dns.timeout_secs),
            ("whois.timeout_secs", self.whois.timeout_secs),
            ("http.request_timeout_secs", self.http.request_timeout_secs),
            ("browser.page_load_timeout_secs", self.browser.page_load_timeout_secs),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::ZeroValue { field: field.to_string() });
            }
        }
        if self.dns.attempts == 0 {
            return Err(ConfigError::ZeroValue {
                field: "dns.attempts".to_string(),
            });
        }

        for (i, server) in self.dns.name_servers.iter().enumerate() {
            if server.parse::<std::net::SocketAddr>().is_err() {
                return Err(ConfigError::InvalidAddress {
                    field: format!("dns.name_servers[{}]", i),
                    address: server.clone(),
                });
            }
        }

        if !(-1.0..=1.0).contains(&self.visual.ssim_threshold) {
            return Err(ConfigError::OutOfRange {
                field: "visual.ssim_threshold".to_string(),
                value: self.visual.ssim_threshold,
            });
        }
        if !(-1.0..=1.0).contains(&self.visual.template_threshold) {
            return Err(ConfigError::OutOfRange {
                field: "visual.template_threshold".to_string(),
                value: self.visual.template_threshold,
            });
        }

        for (i, brand) in self.visual.brands.iter().enumerate() {
            if brand.domains.is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: format!("visual.brands[{}].domains", i),
                });
            }
        }

        if self.browser.screenshot_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "browser.screenshot_dir".to_string(),
            });
        }

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }
}
