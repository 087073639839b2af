use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduling::WorkingHours;
use crate::signature::{SignatureAlgorithm, SignatureEncoding, SignatureScheme};

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["leadline.toml", "config/leadline.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub whatsapp: WhatsAppConfig,
    pub calendar: CalendarConfig,
    pub dispatch: DispatchConfig,
    pub scheduling: SchedulingConfig,
    pub webhooks: WebhooksConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub api_base_url: String,
    pub access_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    pub api_base_url: String,
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub timeout_secs: u64,
    pub history_limit: u32,
}

#[derive(Clone, Debug)]
pub struct SchedulingConfig {
    pub working_hours_start: String,
    pub working_hours_end: String,
    pub default_duration_minutes: u32,
}

#[derive(Clone, Debug)]
pub struct WebhooksConfig {
    pub message_received: WebhookRouteConfig,
    pub agent_events: WebhookRouteConfig,
    pub commands: WebhookRouteConfig,
}

/// Signature settings for one group of inbound routes. Routes without a secret are not verified.
#[derive(Clone, Debug)]
pub struct WebhookRouteConfig {
    pub secret: Option<SecretString>,
    pub header: String,
    pub algorithm: SignatureAlgorithm,
    pub encoding: SignatureEncoding,
    pub prefix: Option<String>,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub whatsapp_access_token: Option<String>,
    pub whatsapp_api_base_url: Option<String>,
    pub calendar_api_base_url: Option<String>,
    pub calendar_token_url: Option<String>,
    pub message_received_secret: Option<String>,
    pub agent_events_secret: Option<String>,
    pub commands_secret: Option<String>,
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
            database: DatabaseConfig {
                url: "sqlite://leadline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            whatsapp: WhatsAppConfig {
                api_base_url: "https://graph.facebook.com/v19.0".to_string(),
                access_token: None,
                timeout_secs: 15,
            },
            calendar: CalendarConfig {
                api_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                client_id: None,
                client_secret: None,
            },
            dispatch: DispatchConfig { timeout_secs: 10, history_limit: 10 },
            scheduling: SchedulingConfig {
                working_hours_start: "09:00".to_string(),
                working_hours_end: "18:00".to_string(),
                default_duration_minutes: 30,
            },
            webhooks: WebhooksConfig {
                message_received: WebhookRouteConfig::with_header("x-hub-signature-256")
                    .prefixed("sha256="),
                agent_events: WebhookRouteConfig::with_header("x-signature"),
                commands: WebhookRouteConfig::with_header("x-webhook-signature"),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl WebhookRouteConfig {
    fn with_header(header: &str) -> Self {
        Self {
            secret: None,
            header: header.to_string(),
            algorithm: SignatureAlgorithm::Sha256,
            encoding: SignatureEncoding::Hex,
            prefix: None,
        }
    }

    fn prefixed(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn scheme(&self) -> SignatureScheme {
        SignatureScheme {
            header: self.header.clone(),
            algorithm: self.algorithm,
            encoding: self.encoding,
            prefix: self.prefix.clone(),
        }
    }

    /// The configured secret, if any and non-blank.
    pub fn active_secret(&self) -> Option<&SecretString> {
        self.secret.as_ref().filter(|secret| !secret.expose_secret().trim().is_empty())
    }
}

impl SchedulingConfig {
    pub fn working_hours(&self) -> Result<WorkingHours, ConfigError> {
        WorkingHours::parse(&self.working_hours_start, &self.working_hours_end)
            .map_err(|error| ConfigError::Validation(format!("scheduling: {error}")))
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(api_base_url) = whatsapp.api_base_url {
                self.whatsapp.api_base_url = api_base_url;
            }
            if let Some(access_token) = whatsapp.access_token {
                self.whatsapp.access_token = Some(secret_value(access_token));
            }
            if let Some(timeout_secs) = whatsapp.timeout_secs {
                self.whatsapp.timeout_secs = timeout_secs;
            }
        }

        if let Some(calendar) = patch.calendar {
            if let Some(api_base_url) = calendar.api_base_url {
                self.calendar.api_base_url = api_base_url;
            }
            if let Some(token_url) = calendar.token_url {
                self.calendar.token_url = token_url;
            }
            if let Some(client_id) = calendar.client_id {
                self.calendar.client_id = Some(client_id);
            }
            if let Some(client_secret) = calendar.client_secret {
                self.calendar.client_secret = Some(secret_value(client_secret));
            }
        }

        if let Some(dispatch) = patch.dispatch {
            if let Some(timeout_secs) = dispatch.timeout_secs {
                self.dispatch.timeout_secs = timeout_secs;
            }
            if let Some(history_limit) = dispatch.history_limit {
                self.dispatch.history_limit = history_limit;
            }
        }

        if let Some(scheduling) = patch.scheduling {
            if let Some(start) = scheduling.working_hours_start {
                self.scheduling.working_hours_start = start;
            }
            if let Some(end) = scheduling.working_hours_end {
                self.scheduling.working_hours_end = end;
            }
            if let Some(minutes) = scheduling.default_duration_minutes {
                self.scheduling.default_duration_minutes = minutes;
            }
        }

        if let Some(webhooks) = patch.webhooks {
            if let Some(route) = webhooks.message_received {
                self.webhooks.message_received.apply_patch(route);
            }
            if let Some(route) = webhooks.agent_events {
                self.webhooks.agent_events.apply_patch(route);
            }
            if let Some(route) = webhooks.commands {
                self.webhooks.commands.apply_patch(route);
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
        if let Some(value) = read_env("LEADLINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEADLINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("LEADLINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LEADLINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEADLINE_SERVER_PORT") {
            self.server.port = parse_u16("LEADLINE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("LEADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_WHATSAPP_API_BASE_URL") {
            self.whatsapp.api_base_url = value;
        }
        if let Some(value) = read_env("LEADLINE_WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADLINE_WHATSAPP_TIMEOUT_SECS") {
            self.whatsapp.timeout_secs = parse_u64("LEADLINE_WHATSAPP_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_CALENDAR_API_BASE_URL") {
            self.calendar.api_base_url = value;
        }
        if let Some(value) = read_env("LEADLINE_CALENDAR_TOKEN_URL") {
            self.calendar.token_url = value;
        }
        if let Some(value) = read_env("LEADLINE_CALENDAR_CLIENT_ID") {
            self.calendar.client_id = Some(value);
        }
        if let Some(value) = read_env("LEADLINE_CALENDAR_CLIENT_SECRET") {
            self.calendar.client_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("LEADLINE_DISPATCH_TIMEOUT_SECS") {
            self.dispatch.timeout_secs = parse_u64("LEADLINE_DISPATCH_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_DISPATCH_HISTORY_LIMIT") {
            self.dispatch.history_limit = parse_u32("LEADLINE_DISPATCH_HISTORY_LIMIT", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_SCHEDULING_WORKING_HOURS_START") {
            self.scheduling.working_hours_start = value;
        }
        if let Some(value) = read_env("LEADLINE_SCHEDULING_WORKING_HOURS_END") {
            self.scheduling.working_hours_end = value;
        }
        if let Some(value) = read_env("LEADLINE_SCHEDULING_DEFAULT_DURATION_MINUTES") {
            self.scheduling.default_duration_minutes =
                parse_u32("LEADLINE_SCHEDULING_DEFAULT_DURATION_MINUTES", &value)?;
        }

        self.webhooks.message_received.apply_env("MESSAGE_RECEIVED")?;
        self.webhooks.agent_events.apply_env("AGENT_EVENTS")?;
        self.webhooks.commands.apply_env("COMMANDS")?;

        let log_level =
            read_env("LEADLINE_LOGGING_LEVEL").or_else(|| read_env("LEADLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADLINE_LOGGING_FORMAT").or_else(|| read_env("LEADLINE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(access_token) = overrides.whatsapp_access_token {
            self.whatsapp.access_token = Some(secret_value(access_token));
        }
        if let Some(api_base_url) = overrides.whatsapp_api_base_url {
            self.whatsapp.api_base_url = api_base_url;
        }
        if let Some(api_base_url) = overrides.calendar_api_base_url {
            self.calendar.api_base_url = api_base_url;
        }
        if let Some(token_url) = overrides.calendar_token_url {
            self.calendar.token_url = token_url;
        }
        if let Some(secret) = overrides.message_received_secret {
            self.webhooks.message_received.secret = Some(secret_value(secret));
        }
        if let Some(secret) = overrides.agent_events_secret {
            self.webhooks.agent_events.secret = Some(secret_value(secret));
        }
        if let Some(secret) = overrides.commands_secret {
            self.webhooks.commands.secret = Some(secret_value(secret));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_calendar(&self.calendar)?;
        validate_dispatch(&self.dispatch)?;
        validate_scheduling(&self.scheduling)?;
        validate_webhook_route("webhooks.message_received", &self.webhooks.message_received)?;
        validate_webhook_route("webhooks.agent_events", &self.webhooks.agent_events)?;
        validate_webhook_route("webhooks.commands", &self.webhooks.commands)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

impl WebhookRouteConfig {
    fn apply_patch(&mut self, patch: WebhookRoutePatch) {
        if let Some(secret) = patch.secret {
            self.secret = Some(secret_value(secret));
        }
        if let Some(header) = patch.header {
            self.header = header;
        }
        if let Some(algorithm) = patch.algorithm {
            self.algorithm = algorithm;
        }
        if let Some(encoding) = patch.encoding {
            self.encoding = encoding;
        }
        if let Some(prefix) = patch.prefix {
            self.prefix = (!prefix.is_empty()).then_some(prefix);
        }
    }

    fn apply_env(&mut self, route: &str) -> Result<(), ConfigError> {
        if let Some(value) = read_env(&format!("LEADLINE_WEBHOOKS_{route}_SECRET")) {
            self.secret = Some(secret_value(value));
        }
        if let Some(value) = read_env(&format!("LEADLINE_WEBHOOKS_{route}_HEADER")) {
            self.header = value;
        }
        let key = format!("LEADLINE_WEBHOOKS_{route}_ALGORITHM");
        if let Some(value) = read_env(&key) {
            self.algorithm = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvOverride { key: key.clone(), value })?;
        }
        let key = format!("LEADLINE_WEBHOOKS_{route}_ENCODING");
        if let Some(value) = read_env(&key) {
            self.encoding = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvOverride { key: key.clone(), value })?;
        }
        if let Some(value) = read_env(&format!("LEADLINE_WEBHOOKS_{route}_PREFIX")) {
            self.prefix = Some(value);
        }
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_whatsapp(whatsapp: &WhatsAppConfig) -> Result<(), ConfigError> {
    validate_http_url("whatsapp.api_base_url", &whatsapp.api_base_url)?;

    if whatsapp.timeout_secs == 0 || whatsapp.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "whatsapp.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_calendar(calendar: &CalendarConfig) -> Result<(), ConfigError> {
    validate_http_url("calendar.api_base_url", &calendar.api_base_url)?;
    validate_http_url("calendar.token_url", &calendar.token_url)?;

    if calendar.client_secret.is_some() && calendar.client_id.is_none() {
        return Err(ConfigError::Validation(
            "calendar.client_secret is set but calendar.client_id is missing".to_string(),
        ));
    }

    Ok(())
}

fn validate_dispatch(dispatch: &DispatchConfig) -> Result<(), ConfigError> {
    if dispatch.timeout_secs == 0 || dispatch.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "dispatch.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if dispatch.history_limit == 0 || dispatch.history_limit > 100 {
        return Err(ConfigError::Validation(
            "dispatch.history_limit must be in range 1..=100".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduling(scheduling: &SchedulingConfig) -> Result<(), ConfigError> {
    scheduling.working_hours()?;

    if scheduling.default_duration_minutes < 5 || scheduling.default_duration_minutes > 480 {
        return Err(ConfigError::Validation(
            "scheduling.default_duration_minutes must be in range 5..=480".to_string(),
        ));
    }

    Ok(())
}

fn validate_webhook_route(name: &str, route: &WebhookRouteConfig) -> Result<(), ConfigError> {
    if route.header.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{name}.header must not be empty")));
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

fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{name} must start with http:// or https://"
        )));
    }
    Ok(())
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
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    whatsapp: Option<WhatsAppPatch>,
    calendar: Option<CalendarPatch>,
    dispatch: Option<DispatchPatch>,
    scheduling: Option<SchedulingPatch>,
    webhooks: Option<WebhooksPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsAppPatch {
    api_base_url: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    api_base_url: Option<String>,
    token_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatchPatch {
    timeout_secs: Option<u64>,
    history_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulingPatch {
    working_hours_start: Option<String>,
    working_hours_end: Option<String>,
    default_duration_minutes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhooksPatch {
    message_received: Option<WebhookRoutePatch>,
    agent_events: Option<WebhookRoutePatch>,
    commands: Option<WebhookRoutePatch>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookRoutePatch {
    secret: Option<String>,
    header: Option<String>,
    algorithm: Option<SignatureAlgorithm>,
    encoding: Option<SignatureEncoding>,
    prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
