/// Configuration management for the Mechaway orchestrator
///
/// Handles server configuration, database location, and the cluster-facing
/// parameters of this main instance (identity, leadership, activation concurrency).

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default number of activation operations allowed to run at once
pub const DEFAULT_ACTIVATION_CONCURRENCY: usize = 5;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Multi-main orchestration configuration
    pub orchestration: OrchestrationConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the workflow database (default: "data")
    /// Creates: {data_dir}/workflows.db
    pub data_dir: String,
}

/// Orchestration configuration for a main instance in a multi-main setup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Identity of this instance, stamped on every published cluster message
    pub instance_id: String,
    /// Whether this instance is the elected leader. Election itself happens elsewhere.
    pub leader: bool,
    /// Capacity of the admission gate guarding trigger registration
    pub activation_concurrency: usize,
    /// Base URLs of peer main instances (e.g. "http://main-2:3004")
    pub peers: Vec<String>,
    /// Shared secret peers must present when delivering cluster commands
    #[serde(default, skip_serializing)]
    pub cluster_token: Option<String>,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("MECHAWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("MECHAWAY_PORT")
                    .unwrap_or_else(|_| "3004".to_string())
                    .parse()
                    .unwrap_or(3004),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("MECHAWAY_DATA_DIR")
                    .unwrap_or_else(|_| "data".to_string()),
            },
            orchestration: OrchestrationConfig {
                instance_id: std::env::var("MECHAWAY_INSTANCE_ID")
                    .unwrap_or_else(|_| format!("main-{}", uuid::Uuid::new_v4())),
                leader: std::env::var("MECHAWAY_LEADER")
                    .map(|value| parse_flag(&value))
                    .unwrap_or(true),
                activation_concurrency: std::env::var("MECHAWAY_ACTIVATION_CONCURRENCY")
                    .ok()
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(DEFAULT_ACTIVATION_CONCURRENCY),
                peers: std::env::var("MECHAWAY_PEERS")
                    .map(|value| parse_peers(&value))
                    .unwrap_or_default(),
                cluster_token: std::env::var("MECHAWAY_CLUSTER_TOKEN")
                    .ok()
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty()),
            },
        }
    }
}

impl Config {
    /// Reject configurations the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.orchestration.activation_concurrency == 0 {
            anyhow::bail!("MECHAWAY_ACTIVATION_CONCURRENCY must be a positive integer");
        }
        if self.orchestration.instance_id.trim().is_empty() {
            anyhow::bail!("MECHAWAY_INSTANCE_ID must not be empty");
        }
        Ok(())
    }

    /// Path of the SQLite database holding workflow definitions and activation state
    pub fn database_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.database.data_dir).join("workflows.db")
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_peers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|peer| peer.trim().trim_end_matches('/'))
        .filter(|peer| !peer.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(concurrency: usize, instance_id: &str) -> Config {
        Config {
            server: ServerConfig { host: "127.0.0.1".to_string(), port: 3004 },
            database: DatabaseConfig { data_dir: "data".to_string() },
            orchestration: OrchestrationConfig {
                instance_id: instance_id.to_string(),
                leader: true,
                activation_concurrency: concurrency,
                peers: vec![],
                cluster_token: None,
            },
        }
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        assert!(config(0, "main-1").validate().is_err());
        assert!(config(1, "main-1").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_instance_id() {
        assert!(config(5, "  ").validate().is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("follower"));
    }

    #[test]
    fn test_parse_peers_trims_and_skips_empty() {
        let peers = parse_peers("http://main-2:3004/, ,http://main-3:3004");
        assert_eq!(peers, vec!["http://main-2:3004", "http://main-3:3004"]);
    }

    #[test]
    fn test_database_path() {
        let path = config(5, "main-1").database_path();
        assert_eq!(path, std::path::Path::new("data").join("workflows.db"));
    }
}
