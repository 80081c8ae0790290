use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_PROMPT_TIMEOUT_SECS: u64 = 900;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub dialogue: DialogueConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub bot_token: SecretString,
    pub application_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogueConfig {
    pub default_timeout_secs: u64,
    pub form_timeout_secs: u64,
    pub max_form_attempts: u32,
    pub handle_ttl_secs: u64,
}

impl DialogueConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn form_timeout(&self) -> Duration {
        Duration::from_secs(self.form_timeout_secs)
    }

    pub fn handle_ttl(&self) -> Duration {
        Duration::from_secs(self.handle_ttl_secs)
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 60,
            form_timeout_secs: 300,
            max_form_attempts: 3,
            handle_ttl_secs: 900,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
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
    pub bot_token: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub default_timeout_secs: Option<u64>,
    pub form_timeout_secs: Option<u64>,
    pub max_form_attempts: Option<u32>,
    pub health_check_port: Option<u16>,
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
            gateway: GatewayConfig { bot_token: String::new().into(), application_id: None },
            dialogue: DialogueConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(gateway) = patch.gateway {
            if let Some(bot_token_value) = gateway.bot_token {
                self.gateway.bot_token = secret_value(bot_token_value);
            }
            if let Some(application_id) = gateway.application_id {
                self.gateway.application_id = Some(application_id);
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(default_timeout_secs) = dialogue.default_timeout_secs {
                self.dialogue.default_timeout_secs = default_timeout_secs;
            }
            if let Some(form_timeout_secs) = dialogue.form_timeout_secs {
                self.dialogue.form_timeout_secs = form_timeout_secs;
            }
            if let Some(max_form_attempts) = dialogue.max_form_attempts {
                self.dialogue.max_form_attempts = max_form_attempts;
            }
            if let Some(handle_ttl_secs) = dialogue.handle_ttl_secs {
                self.dialogue.handle_ttl_secs = handle_ttl_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("PARLEY_GATEWAY_BOT_TOKEN") {
            self.gateway.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("PARLEY_GATEWAY_APPLICATION_ID") {
            self.gateway.application_id = Some(value);
        }

        if let Some(value) = read_env("PARLEY_DIALOGUE_DEFAULT_TIMEOUT_SECS") {
            self.dialogue.default_timeout_secs =
                parse_u64("PARLEY_DIALOGUE_DEFAULT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_DIALOGUE_FORM_TIMEOUT_SECS") {
            self.dialogue.form_timeout_secs =
                parse_u64("PARLEY_DIALOGUE_FORM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_DIALOGUE_MAX_FORM_ATTEMPTS") {
            self.dialogue.max_form_attempts =
                parse_u32("PARLEY_DIALOGUE_MAX_FORM_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_DIALOGUE_HANDLE_TTL_SECS") {
            self.dialogue.handle_ttl_secs = parse_u64("PARLEY_DIALOGUE_HANDLE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PARLEY_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("PARLEY_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.bot_token {
            self.gateway.bot_token = secret_value(bot_token);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(default_timeout_secs) = overrides.default_timeout_secs {
            self.dialogue.default_timeout_secs = default_timeout_secs;
        }
        if let Some(form_timeout_secs) = overrides.form_timeout_secs {
            self.dialogue.form_timeout_secs = form_timeout_secs;
        }
        if let Some(max_form_attempts) = overrides.max_form_attempts {
            self.dialogue.max_form_attempts = max_form_attempts;
        }
        if let Some(health_check_port) = overrides.health_check_port {
            self.server.health_check_port = health_check_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gateway(&self.gateway)?;
        validate_dialogue(&self.dialogue)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
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

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    let bot_token = gateway.bot_token.expose_secret();
    if bot_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.bot_token is required. Copy it from your application's Bot settings page"
                .to_string(),
        ));
    }
    if bot_token.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "gateway.bot_token must not contain whitespace (hint: drop any `Bot ` prefix)"
                .to_string(),
        ));
    }

    if let Some(application_id) = &gateway.application_id {
        if application_id.is_empty() || !application_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::Validation(
                "gateway.application_id must be a numeric snowflake".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if dialogue.default_timeout_secs == 0 || dialogue.default_timeout_secs > MAX_PROMPT_TIMEOUT_SECS
    {
        return Err(ConfigError::Validation(format!(
            "dialogue.default_timeout_secs must be in range 1..={MAX_PROMPT_TIMEOUT_SECS}"
        )));
    }

    if dialogue.form_timeout_secs == 0 || dialogue.form_timeout_secs > MAX_PROMPT_TIMEOUT_SECS {
        return Err(ConfigError::Validation(format!(
            "dialogue.form_timeout_secs must be in range 1..={MAX_PROMPT_TIMEOUT_SECS}"
        )));
    }

    if dialogue.max_form_attempts == 0 {
        return Err(ConfigError::Validation(
            "dialogue.max_form_attempts must be greater than zero".to_string(),
        ));
    }

    if dialogue.handle_ttl_secs < dialogue.form_timeout_secs {
        return Err(ConfigError::Validation(
            "dialogue.handle_ttl_secs must be at least dialogue.form_timeout_secs".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    gateway: Option<GatewayPatch>,
    dialogue: Option<DialoguePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    bot_token: Option<String>,
    application_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    default_timeout_secs: Option<u64>,
    form_timeout_secs: Option<u64>,
    max_form_attempts: Option<u32>,
    handle_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_PARLEY_BOT_TOKEN", "bot-token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("parley.toml");
            fs::write(
                &path,
                r#"
[gateway]
bot_token = "${TEST_PARLEY_BOT_TOKEN}"

[dialogue]
default_timeout_secs = 45
max_form_attempts = 2
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gateway.bot_token.expose_secret() == "bot-token-from-env",
                "bot token should be interpolated from environment",
            )?;
            ensure(config.dialogue.default_timeout_secs == 45, "file timeout should apply")?;
            ensure(config.dialogue.max_form_attempts == 2, "file attempts should apply")?;
            ensure(config.dialogue.form_timeout_secs == 300, "unset keys keep defaults")?;
            Ok(())
        })();

        clear_vars(&["TEST_PARLEY_BOT_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PARLEY_GATEWAY_BOT_TOKEN", "bot-test");
        env::set_var("PARLEY_LOG_LEVEL", "warn");
        env::set_var("PARLEY_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["PARLEY_GATEWAY_BOT_TOKEN", "PARLEY_LOG_LEVEL", "PARLEY_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PARLEY_GATEWAY_BOT_TOKEN", "bot-from-env");
        env::set_var("PARLEY_DIALOGUE_DEFAULT_TIMEOUT_SECS", "120");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("parley.toml");
            fs::write(
                &path,
                r#"
[gateway]
bot_token = "bot-from-file"

[dialogue]
default_timeout_secs = 30
form_timeout_secs = 200

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    form_timeout_secs: Some(240),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gateway.bot_token.expose_secret() == "bot-from-env",
                "env bot token should win over file",
            )?;
            ensure(config.dialogue.default_timeout_secs == 120, "env timeout should win")?;
            ensure(config.dialogue.form_timeout_secs == 240, "override should win over file")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["PARLEY_GATEWAY_BOT_TOKEN", "PARLEY_DIALOGUE_DEFAULT_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PARLEY_GATEWAY_BOT_TOKEN", "bot-valid");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    default_timeout_secs: Some(0),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            }) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("dialogue.default_timeout_secs")
            );
            ensure(has_message, "validation failure should mention dialogue.default_timeout_secs")
        })();

        clear_vars(&["PARLEY_GATEWAY_BOT_TOKEN"]);
        result
    }

    #[test]
    fn missing_bot_token_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["PARLEY_GATEWAY_BOT_TOKEN"]);

        match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::Validation(message)) if message.contains("gateway.bot_token") => {
                Ok(())
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected missing bot token to fail validation".to_string()),
        }
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PARLEY_GATEWAY_BOT_TOKEN", "bot-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("bot-secret-value"),
                "debug output should not contain the bot token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["PARLEY_GATEWAY_BOT_TOKEN"]);
        result
    }
}
