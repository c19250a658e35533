use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::lifecycle::EngineConfig;
use crate::render::RendererConfig;
use crate::resolver::ResolverConfig;
use crate::template::DEFAULT_CACHE_SECONDS;
use crate::validation::{RequiredFieldSet, ValidationConfig};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub resolver: ResolverSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// `memory` or `redis`
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Used when a variable enables caching without a duration
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverSettings {
    /// Deadline for database/api/function/clinical lookups
    #[serde(default = "default_accessor_timeout_ms")]
    pub accessor_timeout_ms: u64,
    /// Deadline for the best-effort alert fetch
    #[serde(default = "default_alert_timeout_ms")]
    pub alert_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationSettings {
    /// Placeholder names that need no variable declaration
    #[serde(default = "default_builtin_variables")]
    pub builtin_variables: Vec<String>,
    /// Fields every template of a given purpose must contain
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<RequiredFieldSet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `plain` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cache_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "ctpl".to_string()
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_CACHE_SECONDS
}

fn default_accessor_timeout_ms() -> u64 {
    2000
}

fn default_alert_timeout_ms() -> u64 {
    1000
}

fn default_builtin_variables() -> Vec<String> {
    ValidationConfig::default().builtin_variables
}

fn default_required_fields() -> Vec<RequiredFieldSet> {
    ValidationConfig::default().required_fields
}

fn default_log_format() -> String {
    "plain".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("cache.backend", default_cache_backend())?
            .set_default("cache.default_ttl_seconds", default_ttl_seconds() as i64)?
            .set_default("resolver.accessor_timeout_ms", default_accessor_timeout_ms() as i64)?
            .set_default("resolver.alert_timeout_ms", default_alert_timeout_ms() as i64)?
            .set_default("logging.format", default_log_format())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // TEMPLATE__SERVER__PORT, TEMPLATE__CACHE__BACKEND, ...
            .add_source(
                Environment::with_prefix("TEMPLATE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("validation.builtin_variables")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            accessor_timeout: Duration::from_millis(self.resolver.accessor_timeout_ms),
            default_cache_ttl_seconds: self.cache.default_ttl_seconds,
        }
    }

    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            alert_timeout: Duration::from_millis(self.resolver.alert_timeout_ms),
        }
    }

    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            builtin_variables: self.validation.builtin_variables.clone(),
            required_fields: self.validation.required_fields.clone(),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            resolver: self.resolver_config(),
            renderer: self.renderer_config(),
            validation: self.validation_config(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            default_ttl_seconds: default_ttl_seconds(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            accessor_timeout_ms: default_accessor_timeout_ms(),
            alert_timeout_ms: default_alert_timeout_ms(),
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            builtin_variables: default_builtin_variables(),
            required_fields: default_required_fields(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.server_addr(), "0.0.0.0:8080");
        assert_eq!(settings.cache.backend, "memory");
        assert_eq!(settings.cache.default_ttl_seconds, 300);
        assert_eq!(settings.resolver.accessor_timeout_ms, 2000);
    }

    #[test]
    fn test_engine_configs() {
        let settings = Settings::default();

        let resolver = settings.resolver_config();
        assert_eq!(resolver.accessor_timeout, Duration::from_secs(2));
        assert_eq!(resolver.default_cache_ttl_seconds, 300);

        let validation = settings.validation_config();
        assert!(validation
            .builtin_variables
            .iter()
            .any(|name| name == "PatientName"));
        assert_eq!(validation.required_fields.len(), 2);
    }
}
