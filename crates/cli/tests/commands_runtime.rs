use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use leadline_cli::commands::{config, doctor, migrate, seed};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());

    with_env(&[("LEADLINE_DATABASE_URL", &url)], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("LEADLINE_DATABASE_URL", "postgres://localhost/leadline")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());

    with_env(&[("LEADLINE_DATABASE_URL", &url)], || {
        let first = seed::run(false);
        assert_eq!(first.exit_code, 0, "expected first seed invocation success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["status"], "ok");

        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("business: biz-demo-001"));
        assert!(message.contains("pipeline: pipe-demo-001 (channel 109876543210)"));

        let second = seed::run(false);
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        assert_eq!(first_payload["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn seed_clean_removes_the_demo_dataset() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());

    with_env(&[("LEADLINE_DATABASE_URL", &url)], || {
        assert_eq!(seed::run(false).exit_code, 0);

        let cleaned = seed::run(true);
        assert_eq!(cleaned.exit_code, 0);
        assert_eq!(parse_payload(&cleaned.output)["message"], "demo dataset removed");

        let report = doctor_report();
        assert_eq!(check_status(&report, "api_keys"), "fail");
    });
}

#[test]
fn doctor_passes_on_a_seeded_and_configured_install() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());

    with_env(
        &[
            ("LEADLINE_DATABASE_URL", &url),
            ("LEADLINE_WHATSAPP_ACCESS_TOKEN", "EAAG-test-token"),
            ("LEADLINE_CALENDAR_CLIENT_ID", "client-id.apps.example.com"),
            ("LEADLINE_CALENDAR_CLIENT_SECRET", "calendar-secret"),
        ],
        || {
            assert_eq!(seed::run(false).exit_code, 0);

            let result = doctor::run(true);
            let report = parse_payload(&result.output);
            assert_eq!(result.exit_code, 0, "doctor report: {report}");
            assert_eq!(report["overall_status"], "pass");
            assert_eq!(report["checks"].as_array().map(Vec::len), Some(6));
        },
    );
}

#[test]
fn doctor_reports_pending_migrations_and_skips_api_keys() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());

    with_env(&[("LEADLINE_DATABASE_URL", &url)], || {
        let report = doctor_report();

        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check_status(&report, "database_connectivity"), "pass");
        assert_eq!(check_status(&report, "schema_migrations"), "fail");
        assert_eq!(check_status(&report, "api_keys"), "skipped");
        assert_eq!(check_status(&report, "whatsapp_token"), "fail");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("LEADLINE_DATABASE_MAX_CONNECTIONS", "many")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let report = parse_payload(&result.output);
        assert_eq!(check_status(&report, "config_validation"), "fail");
        for name in ["whatsapp_token", "database_connectivity", "schema_migrations", "api_keys"] {
            assert_eq!(check_status(&report, name), "skipped", "check `{name}`");
        }
    });
}

#[test]
fn config_redacts_secrets_and_attributes_env_sources() {
    with_env(
        &[
            ("LEADLINE_WHATSAPP_ACCESS_TOKEN", "EAAG-super-secret"),
            ("LEADLINE_WEBHOOKS_COMMANDS_SECRET", "hook0secret"),
        ],
        || {
            let output = config::run();

            assert!(output.contains(
                "- whatsapp.access_token = EAAG-*** (source: env (LEADLINE_WHATSAPP_ACCESS_TOKEN))"
            ));
            assert!(output.contains(
                "- webhooks.commands.secret = <redacted> (source: env (LEADLINE_WEBHOOKS_COMMANDS_SECRET))"
            ));
            assert!(output.contains("- calendar.client_secret = <unset> (source: default)"));
            assert!(!output.contains("super-secret"));
            assert!(!output.contains("hook0secret"));
        },
    );
}

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", dir.join("leadline.db").display())
}

fn doctor_report() -> Value {
    parse_payload(&doctor::run(true).output)
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or("missing")
        .to_string()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "LEADLINE_DATABASE_URL",
        "LEADLINE_DATABASE_MAX_CONNECTIONS",
        "LEADLINE_DATABASE_TIMEOUT_SECS",
        "LEADLINE_WHATSAPP_ACCESS_TOKEN",
        "LEADLINE_WHATSAPP_API_BASE_URL",
        "LEADLINE_CALENDAR_CLIENT_ID",
        "LEADLINE_CALENDAR_CLIENT_SECRET",
        "LEADLINE_SERVER_PORT",
        "LEADLINE_WEBHOOKS_MESSAGE_RECEIVED_SECRET",
        "LEADLINE_WEBHOOKS_AGENT_EVENTS_SECRET",
        "LEADLINE_WEBHOOKS_COMMANDS_SECRET",
        "LEADLINE_LOGGING_LEVEL",
        "LEADLINE_LOGGING_FORMAT",
        "LEADLINE_LOG_LEVEL",
        "LEADLINE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
