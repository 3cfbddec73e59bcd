use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::matching::config::DEFAULT_MAX_CLAIM_RETRIES;
use crate::matching::{CapacityPolicy, MatchingConfig};

/// Deployment stage the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(raw: Option<String>) -> Self {
        let Some(raw) = raw else {
            return Self::Development;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Everything the binary needs at start-up, resolved from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub matching: MatchingSettings,
}

impl AppConfig {
    /// Reads process variables after applying any `.env` file.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration through `lookup`, which returns a variable's raw value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerConfig {
            host: lookup("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "APP_PORT", 3000, ConfigError::InvalidPort)?,
        };
        let telemetry = TelemetryConfig {
            log_level: lookup("APP_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };

        let max_claim_retries = parse_or(
            &lookup,
            "MATCH_MAX_CLAIM_RETRIES",
            DEFAULT_MAX_CLAIM_RETRIES,
            ConfigError::InvalidClaimRetries,
        )?;
        let renewable_capacity = parse_or(
            &lookup,
            "MATCH_RENEWABLE_CAPACITY",
            1u32,
            ConfigError::InvalidCapacity,
        )?;
        if max_claim_retries == 0 {
            return Err(ConfigError::InvalidClaimRetries);
        }
        if renewable_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }

        let matching = MatchingSettings {
            max_claim_retries,
            renewable_capacity,
            operator_token: lookup("MATCH_OPERATOR_TOKEN").filter(|token| !token.trim().is_empty()),
            donors_csv: lookup("MATCH_DONORS_CSV").map(PathBuf::from),
            recipients_csv: lookup("MATCH_RECIPIENTS_CSV").map(PathBuf::from),
        };

        Ok(Self {
            environment: AppEnvironment::parse(lookup("APP_ENV")),
            server,
            telemetry,
            matching,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T, error: ConfigError) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| error),
        None => Ok(default),
    }
}

/// HTTP listener binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.host
                .parse::<IpAddr>()
                .map_err(|source| ConfigError::InvalidHost { source })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Matching engine dials and optional roster files.
#[derive(Debug, Clone)]
pub struct MatchingSettings {
    pub max_claim_retries: u8,
    pub renewable_capacity: u32,
    /// Without a token every batch allocation request is refused.
    pub operator_token: Option<String>,
    pub donors_csv: Option<PathBuf>,
    pub recipients_csv: Option<PathBuf>,
}

impl MatchingSettings {
    pub fn engine_config(&self) -> MatchingConfig {
        MatchingConfig {
            capacity: CapacityPolicy::new(self.renewable_capacity),
            max_claim_retries: self.max_claim_retries,
            ..MatchingConfig::default()
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidClaimRetries,
    InvalidCapacity,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ConfigError::InvalidPort => "APP_PORT must be a valid u16",
            ConfigError::InvalidHost { .. } => "APP_HOST must be localhost or an IP address",
            ConfigError::InvalidClaimRetries => {
                "MATCH_MAX_CLAIM_RETRIES must be an integer between 1 and 255"
            }
            ConfigError::InvalidCapacity => "MATCH_RENEWABLE_CAPACITY must be a positive integer",
        };
        f.write_str(message)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
