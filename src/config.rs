//! Configuration module for the l4scan scanner

use crate::network::Verdict;
use crate::output::OutputFormat;
use crate::scanner::engine::{SessionOptions, DEFAULT_POLL_INTERVAL, MAX_RETRIES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".l4scan.toml";

/// Verdict given to a UDP probe that drew no response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UdpSilencePolicy {
    /// Nothing rejected the datagram
    #[default]
    Open,
    /// Silence is ambiguous; report it like an unanswered TCP probe
    Filtered,
}

impl std::str::FromStr for UdpSilencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(UdpSilencePolicy::Open),
            "filtered" => Ok(UdpSilencePolicy::Filtered),
            _ => Err(format!("Invalid UDP silence policy: {}", s)),
        }
    }
}

impl UdpSilencePolicy {
    pub fn verdict(&self) -> Verdict {
        match self {
            UdpSilencePolicy::Open => Verdict::Open,
            UdpSilencePolicy::Filtered => Verdict::Filtered,
        }
    }
}

/// Main configuration structure for scanning operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Target host name or address
    pub target: String,

    /// Interface whose address probes are sent from
    pub interface: Option<String>,

    pub tcp_ports: Vec<u16>,

    pub udp_ports: Vec<u16>,

    /// Response window per pass in milliseconds
    pub timeout: u64,

    /// Extra passes for unanswered TCP ports
    pub retries: u32,

    /// Delay between starting the listeners and the first send, in milliseconds
    pub warmup: u64,

    /// How long to wait for listeners to stop, in milliseconds
    pub shutdown_grace: u64,

    pub udp_silence: UdpSilencePolicy,

    pub output: OutputFormat,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            interface: None,
            tcp_ports: Vec::new(),
            udp_ports: Vec::new(),
            timeout: 5000,
            retries: 1,
            warmup: 100,
            shutdown_grace: 3000,
            udp_silence: UdpSilencePolicy::Open,
            output: OutputFormat::Text,
        }
    }
}

impl ScanConfig {
    /// Create a new scan configuration
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn with_tcp_ports(mut self, ports: Vec<u16>) -> Self {
        self.tcp_ports = ports;
        self
    }

    pub fn with_udp_ports(mut self, ports: Vec<u16>) -> Self {
        self.udp_ports = ports;
        self
    }

    /// Set the timeout in milliseconds
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_warmup(mut self, warmup: u64) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_udp_silence(mut self, policy: UdpSilencePolicy) -> Self {
        self.udp_silence = policy;
        self
    }

    pub fn with_output(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn warmup_duration(&self) -> Duration {
        Duration::from_millis(self.warmup)
    }

    pub fn shutdown_grace_duration(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            timeout: self.timeout_duration(),
            retries: self.retries,
            warmup: self.warmup_duration(),
            shutdown_grace: self.shutdown_grace_duration(),
            udp_silence: self.udp_silence,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            crate::ScanError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: ScanConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from `~/.l4scan.toml`, falling back to defaults
    pub fn load_default_config() -> Self {
        let path = Self::default_config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::from_toml_file(&path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.target.trim().is_empty() {
            return Err(crate::ScanError::InvalidTarget("Target cannot be empty".to_string()));
        }

        if self.tcp_ports.is_empty() && self.udp_ports.is_empty() {
            return Err(crate::ScanError::PortRangeError("No ports specified".to_string()));
        }

        if self.tcp_ports.contains(&0) || self.udp_ports.contains(&0) {
            return Err(crate::ScanError::PortRangeError("Port 0 cannot be scanned".to_string()));
        }

        if self.timeout == 0 {
            return Err(crate::ScanError::ConfigError("Timeout must be greater than 0".to_string()));
        }

        if self.retries > MAX_RETRIES {
            return Err(crate::ScanError::ConfigError(format!(
                "At most {} retries are supported",
                MAX_RETRIES
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.timeout, 5000);
        assert_eq!(config.retries, 1);
        assert_eq!(config.udp_silence, UdpSilencePolicy::Open);
        assert_eq!(config.timeout_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate() {
        let config = ScanConfig::new("10.0.0.1").with_tcp_ports(vec![22]);
        assert!(config.validate().is_ok());

        assert!(ScanConfig::new("10.0.0.1").validate().is_err());
        assert!(ScanConfig::new("").with_tcp_ports(vec![22]).validate().is_err());
        assert!(config.clone().with_timeout(0).validate().is_err());
        assert!(config.clone().with_retries(MAX_RETRIES + 1).validate().is_err());
        assert!(config.with_udp_ports(vec![0]).validate().is_err());
    }

    #[test]
    fn test_session_options() {
        let options = ScanConfig::new("host")
            .with_timeout(200)
            .with_warmup(0)
            .with_udp_silence(UdpSilencePolicy::Filtered)
            .session_options();
        assert_eq!(options.timeout, Duration::from_millis(200));
        assert_eq!(options.warmup, Duration::ZERO);
        assert_eq!(options.udp_silence.verdict(), Verdict::Filtered);
    }

    #[test]
    fn test_partial_toml() {
        let config: ScanConfig = toml::from_str("timeout = 750\nudp_silence = \"filtered\"\n").unwrap();
        assert_eq!(config.timeout, 750);
        assert_eq!(config.udp_silence, UdpSilencePolicy::Filtered);
        assert_eq!(config.retries, 1);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Filtered".parse::<UdpSilencePolicy>(), Ok(UdpSilencePolicy::Filtered));
        assert!("maybe".parse::<UdpSilencePolicy>().is_err());
    }
}
