//! Configuration file support for cadence
//!
//! TOML profiles describe one experiment: where to send requests, which loops
//! run, how the local resources are served, and where the report goes. Any
//! value can be overridden from the command line with `--set key.path=value`.

use anyhow::{bail, Context, Result};
use cadence_core::config::WorkloadConfig;
use cadence_transport::{Destination, UdpTransportConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level profile configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ProfileConfig {
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Experiment metadata
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ExperimentConfig {
    /// Experiment name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Random seed for reproducibility (None = use entropy)
    #[serde(default)]
    pub seed: Option<u64>,
    /// Stop after this long (None = run until interrupted)
    #[serde(with = "humantime_serde", default)]
    #[schemars(with = "Option<String>")]
    pub duration: Option<Duration>,
}

/// Peer that receives our requests
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct TargetConfig {
    /// Peer address (e.g., "[2001:db8::1]:5684") - can be overridden via --set
    #[serde(default)]
    pub address: Option<String>,
}

/// Local resources answering the peer's requests
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ServerConfig {
    /// Register the periodic and aperiodic resources
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local address shared by the client and server roles
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { enabled: true, bind: default_bind() }
    }
}

fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    format!("[::]:{}", cadence_transport::udp::DEFAULT_PORT)
}

/// Datagram transport tuning
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct TransportConfig {
    /// Consecutive failed requests tolerated before the session counts as lost
    #[serde(default = "default_max_unacked")]
    pub max_unacked: u32,
    /// How long a request may wait for its acknowledgment
    #[serde(with = "humantime_serde", default = "default_ack_timeout")]
    #[schemars(with = "String")]
    pub ack_timeout: Duration,
    /// Periodic request payload in bytes
    #[serde(default = "default_payload")]
    pub periodic_payload: usize,
    /// Aperiodic request payload in bytes
    #[serde(default = "default_payload")]
    pub aperiodic_payload: usize,
    /// Longest the receive thread blocks in one poll
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    #[schemars(with = "String")]
    pub poll_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_unacked: default_max_unacked(),
            ack_timeout: default_ack_timeout(),
            periodic_payload: default_payload(),
            aperiodic_payload: default_payload(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_max_unacked() -> u32 {
    3
}

fn default_ack_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_payload() -> usize {
    16
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(50)
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct OutputConfig {
    /// Output format: json, none
    #[serde(default = "default_format")]
    pub format: String,
    /// Output file path (required for json)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { format: default_format(), file: None }
    }
}

fn default_format() -> String {
    "none".to_string()
}

impl ProfileConfig {
    /// Load profile from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ProfileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // Validation happens in the caller or in from_file_with_overrides(), so a
        // profile without a target can still be loaded and completed via --set
        Ok(config)
    }

    /// Load profile from TOML file with --set style overrides
    pub fn from_file_with_overrides<P: AsRef<Path>>(path: P, overrides: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        for override_str in overrides {
            let (key, val) = parse_key_value(override_str)
                .with_context(|| format!("Invalid override format: {}", override_str))?;

            set_toml_path(&mut value, &key, &val)
                .with_context(|| format!("Failed to apply override: {}", override_str))?;
        }

        let config: ProfileConfig = value
            .try_into()
            .with_context(|| "Failed to deserialize modified configuration")?;

        Ok(config)
    }

    /// Validate configuration for the `run` command
    pub fn validate(&self) -> Result<()> {
        self.validate_common()?;

        match &self.target.address {
            Some(address) if address.is_empty() => bail!("Target address cannot be empty"),
            Some(_) => {
                self.destination()?;
            }
            None => bail!("Target address must be specified (e.g. --set target.address=[::1]:5684)"),
        }

        self.workload.validate()?;

        let enabled = self.workload.enabled_classes();
        if !enabled.iter().any(|class| self.workload.reconnects(*class)) {
            tracing::warn!(
                "No enabled loop reconnects; a lost session stays down for the rest of the run"
            );
        }

        Ok(())
    }

    /// Validate configuration for the `serve` command
    pub fn validate_serve(&self) -> Result<()> {
        self.validate_common()?;
        if !self.server.enabled {
            bail!("server.enabled must be true to serve");
        }
        Ok(())
    }

    fn validate_common(&self) -> Result<()> {
        if self.experiment.name.is_empty() {
            bail!("Experiment name cannot be empty");
        }
        if let Some(duration) = self.experiment.duration {
            if duration.is_zero() {
                bail!("Experiment duration must be > 0");
            }
        }

        self.bind_addr()?;

        if self.transport.max_unacked == 0 {
            bail!("transport.max_unacked must be > 0");
        }
        if self.transport.ack_timeout.is_zero() {
            bail!("transport.ack_timeout must be > 0");
        }
        if self.transport.ack_timeout > Duration::from_secs(3600) {
            bail!("transport.ack_timeout must be at most 1h");
        }
        if self.transport.poll_interval.is_zero() {
            bail!("transport.poll_interval must be > 0");
        }

        let valid_formats = ["json", "none"];
        if !valid_formats.contains(&self.output.format.as_str()) {
            bail!(
                "Invalid output format '{}'. Valid options: {}",
                self.output.format,
                valid_formats.join(", ")
            );
        }
        if self.output.format == "json" && self.output.file.is_none() {
            bail!("output.file must be set when output.format is 'json'");
        }

        Ok(())
    }

    /// Parsed target address
    pub fn destination(&self) -> Result<Destination> {
        let address = self
            .target
            .address
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Target address must be specified"))?;
        address
            .parse::<Destination>()
            .with_context(|| format!("Invalid target address '{}'", address))
    }

    /// Parsed local bind address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid server.bind address '{}'", self.server.bind))
    }

    /// Transport settings for [`cadence_transport::UdpTransport::bind`]
    pub fn udp_config(&self) -> Result<UdpTransportConfig> {
        Ok(UdpTransportConfig {
            bind: self.bind_addr()?,
            max_unacked: self.transport.max_unacked,
            ack_timeout: self.transport.ack_timeout,
            periodic_payload: self.transport.periodic_payload,
            aperiodic_payload: self.transport.aperiodic_payload,
            poll_interval: self.transport.poll_interval,
        })
    }
}

/// Parse a "key=value" string into (key, value) tuple
fn parse_key_value(override_str: &str) -> Result<(String, String)> {
    match override_str.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => bail!("Invalid override format '{}'. Expected 'key=value'", override_str),
    }
}

/// Set a value in TOML using dot-notation path
fn set_toml_path(root: &mut toml::Value, path: &str, value_str: &str) -> Result<()> {
    let keys = parse_path(path);
    let Some((last, parents)) = keys.split_last() else {
        bail!("Empty path");
    };

    let mut current = root;
    for key in parents {
        let toml::Value::Table(table) = current else {
            bail!("Cannot navigate through non-table value at key '{}'", key);
        };
        // Intermediate tables are created on demand
        current = table
            .entry(key.to_string())
            .or_insert_with(|| toml::Value::Table(Default::default()));
    }

    let toml::Value::Table(table) = current else {
        bail!("Cannot set '{}' on a non-table value", last);
    };
    table.insert(last.to_string(), parse_value(value_str)?);
    Ok(())
}

/// Split a dotted path into its keys, skipping empty segments
fn parse_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|part| !part.is_empty()).collect()
}

/// Parse a string value with type inference
fn parse_value(value_str: &str) -> Result<toml::Value> {
    let trimmed = value_str.trim();

    if trimmed == "true" {
        return Ok(toml::Value::Boolean(true));
    }
    if trimmed == "false" {
        return Ok(toml::Value::Boolean(false));
    }

    if let Ok(int_val) = trimmed.parse::<i64>() {
        return Ok(toml::Value::Integer(int_val));
    }

    if let Ok(float_val) = trimmed.parse::<f64>() {
        return Ok(toml::Value::Float(float_val));
    }

    // Arrays and inline tables go through the TOML parser
    let is_array = trimmed.starts_with('[') && trimmed.ends_with(']');
    let is_table = trimmed.starts_with('{') && trimmed.ends_with('}');
    if is_array || is_table {
        let wrapped = format!("value = {}", trimmed);
        if let Ok(toml::Value::Table(mut table)) = toml::from_str::<toml::Value>(&wrapped) {
            if let Some(value) = table.remove("value") {
                return Ok(value);
            }
        }
        // Bracketed IPv6 socket addresses such as [::1]:5684 are plain strings
        if is_table {
            bail!("Failed to parse inline table: {}", trimmed);
        }
    }

    let string_val = if (trimmed.starts_with('"') && trimmed.ends_with('"'))
        || (trimmed.starts_with('\'') && trimmed.ends_with('\''))
    {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    Ok(toml::Value::String(string_val.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_segments() {
        assert_eq!(
            parse_path("workload.periodic.interval"),
            vec!["workload", "periodic", "interval"]
        );
        assert_eq!(parse_path(".target..address"), vec!["target", "address"]);
        assert!(parse_path("").is_empty());
    }

    #[test]
    fn test_parse_value_inference() {
        assert_eq!(parse_value("true").unwrap(), toml::Value::Boolean(true));
        assert_eq!(parse_value("42").unwrap(), toml::Value::Integer(42));
        assert_eq!(parse_value("0.05").unwrap(), toml::Value::Float(0.05));
        assert_eq!(parse_value("250ms").unwrap(), toml::Value::String("250ms".into()));
        assert_eq!(parse_value("'quoted'").unwrap(), toml::Value::String("quoted".into()));
        assert_eq!(
            parse_value("[1, 2]").unwrap(),
            toml::Value::Array(vec![toml::Value::Integer(1), toml::Value::Integer(2)])
        );
    }

    #[test]
    fn test_parse_value_ipv6_socket_address() {
        assert_eq!(
            parse_value("[2001:db8::1]:5684").unwrap(),
            toml::Value::String("[2001:db8::1]:5684".into())
        );
        assert!(parse_value("{ not toml").is_ok());
        assert!(parse_value("{ broken = }").is_err());
    }

    #[test]
    fn test_set_toml_path_rejects_non_tables() {
        let mut root: toml::Value = toml::from_str("[target]\naddress = \"[::1]:5684\"").unwrap();

        assert!(set_toml_path(&mut root, "target.address.port", "1").is_err());
        assert!(set_toml_path(&mut root, "", "1").is_err());

        set_toml_path(&mut root, "target.address", "[::1]:9000").unwrap();
        assert_eq!(root["target"]["address"], toml::Value::String("[::1]:9000".into()));
    }

    #[test]
    fn test_set_toml_path_creates_tables() {
        let mut root = toml::Value::Table(Default::default());
        set_toml_path(&mut root, "workload.aperiodic.lambda_per_ms", "0.5").unwrap();
        assert_eq!(root["workload"]["aperiodic"]["lambda_per_ms"], toml::Value::Float(0.5));
    }

    #[test]
    fn test_parse_key_value_splits_once() {
        assert_eq!(
            parse_key_value("target.address=a=b").unwrap(),
            ("target.address".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("no-equals").is_err());
    }
}
