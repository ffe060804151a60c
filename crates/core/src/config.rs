use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub salesforce: SalesforceConfig,
    pub anthropic: AnthropicConfig,
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SalesforceConfig {
    pub login_url: String,
    pub username: String,
    pub password: SecretString,
    pub security_token: SecretString,
    pub client_id: String,
    pub client_secret: SecretString,
    pub api_version: String,
}

#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub expose_upstream_errors: bool,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub salesforce_username: Option<String>,
    pub salesforce_password: Option<String>,
    pub salesforce_security_token: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: Option<String>,
    pub server_port: Option<u16>,
    pub rate_limit_max_requests: Option<u32>,
    pub rate_limit_window_secs: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            salesforce: SalesforceConfig {
                login_url: "https://login.salesforce.com".to_string(),
                username: String::new(),
                password: String::new().into(),
                security_token: String::new().into(),
                client_id: String::new(),
                client_secret: String::new().into(),
                api_version: "58.0".to_string(),
            },
            anthropic: AnthropicConfig {
                api_key: None,
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-3-5-sonnet-latest".to_string(),
                max_tokens: 1024,
                timeout_secs: 60,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                expose_upstream_errors: true,
            },
            rate_limit: RateLimitConfig { max_requests: 5, window_secs: 60 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("crmrelay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(salesforce) = patch.salesforce {
            if let Some(login_url) = salesforce.login_url {
                self.salesforce.login_url = login_url;
            }
            if let Some(username) = salesforce.username {
                self.salesforce.username = username;
            }
            if let Some(password_value) = salesforce.password {
                self.salesforce.password = secret_value(password_value);
            }
            if let Some(token_value) = salesforce.security_token {
                self.salesforce.security_token = secret_value(token_value);
            }
            if let Some(client_id) = salesforce.client_id {
                self.salesforce.client_id = client_id;
            }
            if let Some(client_secret_value) = salesforce.client_secret {
                self.salesforce.client_secret = secret_value(client_secret_value);
            }
            if let Some(api_version) = salesforce.api_version {
                self.salesforce.api_version = api_version;
            }
        }

        if let Some(anthropic) = patch.anthropic {
            if let Some(api_key_value) = anthropic.api_key {
                self.anthropic.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = anthropic.base_url {
                self.anthropic.base_url = base_url;
            }
            if let Some(model) = anthropic.model {
                self.anthropic.model = model;
            }
            if let Some(max_tokens) = anthropic.max_tokens {
                self.anthropic.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = anthropic.timeout_secs {
                self.anthropic.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(expose) = server.expose_upstream_errors {
                self.server.expose_upstream_errors = expose;
            }
        }

        if let Some(rate_limit) = patch.rate_limit {
            if let Some(max_requests) = rate_limit.max_requests {
                self.rate_limit.max_requests = max_requests;
            }
            if let Some(window_secs) = rate_limit.window_secs {
                self.rate_limit.window_secs = window_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CRMRELAY_SALESFORCE_LOGIN_URL") {
            self.salesforce.login_url = value;
        }
        if let Some(value) = read_env("CRMRELAY_SALESFORCE_USERNAME") {
            self.salesforce.username = value;
        }
        if let Some(value) = read_env("CRMRELAY_SALESFORCE_PASSWORD") {
            self.salesforce.password = secret_value(value);
        }
        if let Some(value) = read_env("CRMRELAY_SALESFORCE_SECURITY_TOKEN") {
            self.salesforce.security_token = secret_value(value);
        }
        if let Some(value) = read_env("CRMRELAY_SALESFORCE_CLIENT_ID") {
            self.salesforce.client_id = value;
        }
        if let Some(value) = read_env("CRMRELAY_SALESFORCE_CLIENT_SECRET") {
            self.salesforce.client_secret = secret_value(value);
        }
        if let Some(value) = read_env("CRMRELAY_SALESFORCE_API_VERSION") {
            self.salesforce.api_version = value;
        }

        if let Some(value) = read_env("CRMRELAY_ANTHROPIC_API_KEY") {
            self.anthropic.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CRMRELAY_ANTHROPIC_BASE_URL") {
            self.anthropic.base_url = value;
        }
        if let Some(value) = read_env("CRMRELAY_ANTHROPIC_MODEL") {
            self.anthropic.model = value;
        }
        if let Some(value) = read_env("CRMRELAY_ANTHROPIC_MAX_TOKENS") {
            self.anthropic.max_tokens = parse_u32("CRMRELAY_ANTHROPIC_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("CRMRELAY_ANTHROPIC_TIMEOUT_SECS") {
            self.anthropic.timeout_secs = parse_u64("CRMRELAY_ANTHROPIC_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CRMRELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CRMRELAY_SERVER_PORT") {
            self.server.port = parse_u16("CRMRELAY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CRMRELAY_SERVER_EXPOSE_UPSTREAM_ERRORS") {
            self.server.expose_upstream_errors =
                parse_bool("CRMRELAY_SERVER_EXPOSE_UPSTREAM_ERRORS", &value)?;
        }

        if let Some(value) = read_env("CRMRELAY_RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = parse_u32("CRMRELAY_RATE_LIMIT_MAX_REQUESTS", &value)?;
        }
        if let Some(value) = read_env("CRMRELAY_RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = parse_u64("CRMRELAY_RATE_LIMIT_WINDOW_SECS", &value)?;
        }

        let log_level =
            read_env("CRMRELAY_LOGGING_LEVEL").or_else(|| read_env("CRMRELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CRMRELAY_LOGGING_FORMAT").or_else(|| read_env("CRMRELAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(username) = overrides.salesforce_username {
            self.salesforce.username = username;
        }
        if let Some(password) = overrides.salesforce_password {
            self.salesforce.password = secret_value(password);
        }
        if let Some(token) = overrides.salesforce_security_token {
            self.salesforce.security_token = secret_value(token);
        }
        if let Some(api_key) = overrides.anthropic_api_key {
            self.anthropic.api_key = Some(secret_value(api_key));
        }
        if let Some(model) = overrides.anthropic_model {
            self.anthropic.model = model;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(max_requests) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = max_requests;
        }
        if let Some(window_secs) = overrides.rate_limit_window_secs {
            self.rate_limit.window_secs = window_secs;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_salesforce(&self.salesforce)?;
        validate_anthropic(&self.anthropic)?;
        validate_server(&self.server)?;
        validate_rate_limit(&self.rate_limit)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("crmrelay.toml"), PathBuf::from("config/crmrelay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_salesforce(salesforce: &SalesforceConfig) -> Result<(), ConfigError> {
    let login_url = salesforce.login_url.trim();
    if !login_url.starts_with("http://") && !login_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "salesforce.login_url must start with http:// or https://".to_string(),
        ));
    }

    if salesforce.username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "salesforce.username is required (the integration user's login)".to_string(),
        ));
    }

    if salesforce.password.expose_secret().is_empty() {
        return Err(ConfigError::Validation("salesforce.password is required".to_string()));
    }

    if salesforce.client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "salesforce.client_id is required (the connected app consumer key)".to_string(),
        ));
    }

    if salesforce.api_version.trim().is_empty()
        || !salesforce.api_version.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return Err(ConfigError::Validation(
            "salesforce.api_version must be a numeric version such as `58.0`".to_string(),
        ));
    }

    Ok(())
}

fn validate_anthropic(anthropic: &AnthropicConfig) -> Result<(), ConfigError> {
    let base_url = anthropic.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "anthropic.base_url must start with http:// or https://".to_string(),
        ));
    }

    if anthropic.model.trim().is_empty() {
        return Err(ConfigError::Validation("anthropic.model must not be empty".to_string()));
    }

    if anthropic.max_tokens == 0 || anthropic.max_tokens > 200_000 {
        return Err(ConfigError::Validation(
            "anthropic.max_tokens must be in range 1..=200000".to_string(),
        ));
    }

    if anthropic.timeout_secs == 0 || anthropic.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "anthropic.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation(
            "server.bind_address must not be empty".to_string(),
        ));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_rate_limit(rate_limit: &RateLimitConfig) -> Result<(), ConfigError> {
    if rate_limit.max_requests == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.max_requests must be greater than zero".to_string(),
        ));
    }

    if rate_limit.window_secs == 0 || rate_limit.window_secs > 3600 {
        return Err(ConfigError::Validation(
            "rate_limit.window_secs must be in range 1..=3600".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    salesforce: Option<SalesforcePatch>,
    anthropic: Option<AnthropicPatch>,
    server: Option<ServerPatch>,
    rate_limit: Option<RateLimitPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SalesforcePatch {
    login_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    security_token: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    api_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    expose_upstream_errors: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    max_requests: Option<u32>,
    window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
