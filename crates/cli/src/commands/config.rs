use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use leadline_core::config::{AppConfig, LoadOptions, WebhookRouteConfig, CONFIG_FILE_CANDIDATES};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field {
    key: String,
    env_key: String,
    value: String,
}

impl Field {
    fn new(key: &str, env_key: &str, value: impl Into<String>) -> Self {
        Self { key: key.to_string(), env_key: env_key.to_string(), value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            &field.key,
            &field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(&field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let mut fields = vec![
        Field::new("database.url", "LEADLINE_DATABASE_URL", config.database.url.clone()),
        Field::new(
            "database.max_connections",
            "LEADLINE_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            "LEADLINE_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        Field::new(
            "server.bind_address",
            "LEADLINE_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        Field::new("server.port", "LEADLINE_SERVER_PORT", config.server.port.to_string()),
        Field::new(
            "server.graceful_shutdown_secs",
            "LEADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        Field::new(
            "whatsapp.api_base_url",
            "LEADLINE_WHATSAPP_API_BASE_URL",
            config.whatsapp.api_base_url.clone(),
        ),
        Field::new(
            "whatsapp.access_token",
            "LEADLINE_WHATSAPP_ACCESS_TOKEN",
            redact_secret(config.whatsapp.access_token.as_ref()),
        ),
        Field::new(
            "whatsapp.timeout_secs",
            "LEADLINE_WHATSAPP_TIMEOUT_SECS",
            config.whatsapp.timeout_secs.to_string(),
        ),
        Field::new(
            "calendar.api_base_url",
            "LEADLINE_CALENDAR_API_BASE_URL",
            config.calendar.api_base_url.clone(),
        ),
        Field::new(
            "calendar.token_url",
            "LEADLINE_CALENDAR_TOKEN_URL",
            config.calendar.token_url.clone(),
        ),
        Field::new(
            "calendar.client_id",
            "LEADLINE_CALENDAR_CLIENT_ID",
            config.calendar.client_id.as_deref().unwrap_or("<unset>"),
        ),
        Field::new(
            "calendar.client_secret",
            "LEADLINE_CALENDAR_CLIENT_SECRET",
            redact_secret(config.calendar.client_secret.as_ref()),
        ),
        Field::new(
            "dispatch.timeout_secs",
            "LEADLINE_DISPATCH_TIMEOUT_SECS",
            config.dispatch.timeout_secs.to_string(),
        ),
        Field::new(
            "dispatch.history_limit",
            "LEADLINE_DISPATCH_HISTORY_LIMIT",
            config.dispatch.history_limit.to_string(),
        ),
        Field::new(
            "scheduling.working_hours_start",
            "LEADLINE_SCHEDULING_WORKING_HOURS_START",
            config.scheduling.working_hours_start.clone(),
        ),
        Field::new(
            "scheduling.working_hours_end",
            "LEADLINE_SCHEDULING_WORKING_HOURS_END",
            config.scheduling.working_hours_end.clone(),
        ),
        Field::new(
            "scheduling.default_duration_minutes",
            "LEADLINE_SCHEDULING_DEFAULT_DURATION_MINUTES",
            config.scheduling.default_duration_minutes.to_string(),
        ),
    ];

    webhook_fields(&mut fields, "message_received", &config.webhooks.message_received);
    webhook_fields(&mut fields, "agent_events", &config.webhooks.agent_events);
    webhook_fields(&mut fields, "commands", &config.webhooks.commands);

    fields.push(Field::new(
        "logging.level",
        "LEADLINE_LOGGING_LEVEL",
        config.logging.level.clone(),
    ));
    fields.push(Field::new(
        "logging.format",
        "LEADLINE_LOGGING_FORMAT",
        format!("{:?}", config.logging.format),
    ));
    fields
}

fn webhook_fields(fields: &mut Vec<Field>, route: &str, config: &WebhookRouteConfig) {
    let key_prefix = format!("webhooks.{route}");
    let env_prefix = format!("LEADLINE_WEBHOOKS_{}", route.to_ascii_uppercase());

    fields.push(Field::new(
        &format!("{key_prefix}.secret"),
        &format!("{env_prefix}_SECRET"),
        redact_secret(config.secret.as_ref()),
    ));
    fields.push(Field::new(
        &format!("{key_prefix}.header"),
        &format!("{env_prefix}_HEADER"),
        config.header.clone(),
    ));
    fields.push(Field::new(
        &format!("{key_prefix}.algorithm"),
        &format!("{env_prefix}_ALGORITHM"),
        format!("{:?}", config.algorithm),
    ));
}

fn detect_config_path() -> Option<PathBuf> {
    CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var(env_key).is_ok_and(|value| !value.trim().is_empty()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a short recognisable prefix such as `EAAG-***` and hides the rest.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
