//! Configuration module for the wsgate server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

use crate::connection::ConnectionSettings;
use crate::server::{ListenOptions, ServerSettings, MAX_CONNECTIONS};

/// Command-line arguments for the WebSocket server
#[derive(Parser, Debug, Default)]
#[command(name = "wsgate")]
#[command(author = "wsgate authors")]
#[command(version = "0.1.0")]
#[command(about = "A WebSocket (RFC 6455) server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on (e.g., 127.0.0.1:8080); repeat for several
    #[arg(short = 'l', long)]
    pub listen: Vec<String>,

    /// Maximum number of concurrent connections
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Largest accepted frame payload in bytes
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Capacity of each connection's inbound and outbound queue
    #[arg(long)]
    pub channel_capacity: Option<usize>,

    /// Subprotocol served by the echo handler; repeat for several
    #[arg(short = 'p', long = "subprotocol")]
    pub subprotocols: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Addresses to listen on
    #[serde(default = "default_listen")]
    pub listen: Vec<String>,
    #[serde(flatten)]
    pub options: ListenOptions,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            options: ListenOptions::default(),
            max_connections: default_max_connections(),
        }
    }
}

/// Protocol-related configuration
#[derive(Debug, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Subprotocol names bound to the echo handler. The empty name accepts
    /// clients that request no subprotocol.
    #[serde(default = "default_subprotocols")]
    pub subprotocols: Vec<String>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_payload_size: default_max_payload_size(),
            channel_capacity: default_channel_capacity(),
            subprotocols: default_subprotocols(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> Vec<String> {
    vec!["127.0.0.1:8080".to_string()]
}

fn default_max_connections() -> usize {
    MAX_CONNECTIONS
}

fn default_max_payload_size() -> usize {
    crate::codec::parser::DEFAULT_MAX_PAYLOAD
}

fn default_channel_capacity() -> usize {
    64
}

fn default_subprotocols() -> Vec<String> {
    vec![String::new(), "echo".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: Vec<SocketAddr>,
    pub listen_options: ListenOptions,
    pub max_connections: usize,
    pub max_payload_size: usize,
    pub channel_capacity: usize,
    pub subprotocols: Vec<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = if cli.listen.is_empty() {
            toml_config.server.listen
        } else {
            cli.listen
        };
        let listen = listen
            .into_iter()
            .map(|addr| {
                addr.parse()
                    .map_err(|e| ConfigError::InvalidAddress(addr.clone(), e))
            })
            .collect::<Result<Vec<SocketAddr>, _>>()?;

        Ok(Config {
            listen,
            listen_options: toml_config.server.options,
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            max_payload_size: cli
                .max_payload_size
                .unwrap_or(toml_config.websocket.max_payload_size),
            channel_capacity: cli
                .channel_capacity
                .unwrap_or(toml_config.websocket.channel_capacity),
            subprotocols: if cli.subprotocols.is_empty() {
                toml_config.websocket.subprotocols
            } else {
                cli.subprotocols
            },
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            max_connections: self.max_connections,
            connection: ConnectionSettings {
                max_payload_size: self.max_payload_size,
                channel_capacity: self.channel_capacity,
            },
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidAddress(String, AddrParseError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidAddress(addr, e) => {
                write!(f, "Invalid listen address '{}': {}", addr, e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
