use leadline_core::config::{AppConfig, LoadOptions};
use leadline_db::repositories::{ApiKeyRepository, SqlApiKeyRepository};
use leadline_db::{connect, migrations, DbPool};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DATABASE_CHECKS: [&str; 3] = ["database_connectivity", "schema_migrations", "api_keys"];

/// Exit code is 0 when every check passes and 1 otherwise.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_whatsapp_token(&config));
            checks.push(check_calendar_credentials(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            let dependent = ["whatsapp_token", "calendar_credentials"];
            for name in dependent.into_iter().chain(DATABASE_CHECKS) {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_whatsapp_token(config: &AppConfig) -> DoctorCheck {
    if config.whatsapp.access_token.is_some() {
        DoctorCheck::pass("whatsapp_token", "access token configured")
    } else {
        DoctorCheck::fail(
            "whatsapp_token",
            "whatsapp.access_token is unset; message history and replies will fail",
        )
    }
}

fn check_calendar_credentials(config: &AppConfig) -> DoctorCheck {
    match (&config.calendar.client_id, &config.calendar.client_secret) {
        (Some(_), Some(_)) => {
            DoctorCheck::pass("calendar_credentials", "oauth client credentials configured")
        }
        _ => DoctorCheck::fail(
            "calendar_credentials",
            "calendar.client_id and calendar.client_secret are required to refresh expired tokens",
        ),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let mut checks = vec![DoctorCheck::fail(
                "database_connectivity",
                format!("failed to initialize async runtime: {error}"),
            )];
            checks.extend(
                DATABASE_CHECKS[1..]
                    .iter()
                    .map(|name| DoctorCheck::skipped(*name, "the async runtime did not start")),
            );
            return checks;
        }
    };

    runtime.block_on(async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                let mut checks = vec![DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to connect to database: {error}"),
                )];
                checks.extend(
                    DATABASE_CHECKS[1..]
                        .iter()
                        .map(|name| DoctorCheck::skipped(*name, "the database is unreachable")),
                );
                return checks;
            }
        };

        let connectivity = DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        );
        let schema = check_schema(&pool).await;
        let api_keys = if schema.status == CheckStatus::Pass {
            check_api_keys(&pool).await
        } else {
            DoctorCheck::skipped("api_keys", "the schema is not current")
        };

        pool.close().await;
        vec![connectivity, schema, api_keys]
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    let expected: Vec<i64> = migrations::MIGRATOR
        .iter()
        .filter(|migration| migration.migration_type.is_up_migration())
        .map(|migration| migration.version)
        .collect();

    // The bookkeeping table is missing until the first migration run.
    let applied: Vec<i64> =
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await
            .unwrap_or_default();

    let pending: Vec<String> = expected
        .iter()
        .filter(|version| !applied.contains(version))
        .map(|version| version.to_string())
        .collect();

    if pending.is_empty() {
        DoctorCheck::pass("schema_migrations", format!("{} migrations applied", applied.len()))
    } else {
        DoctorCheck::fail(
            "schema_migrations",
            format!("pending migrations: {}; run `leadline migrate`", pending.join(", ")),
        )
    }
}

async fn check_api_keys(pool: &DbPool) -> DoctorCheck {
    match SqlApiKeyRepository::new(pool.clone()).list_active().await {
        Ok(keys) if keys.is_empty() => DoctorCheck::fail(
            "api_keys",
            "no active API keys; the message proxy rejects every call",
        ),
        Ok(keys) => DoctorCheck::pass("api_keys", format!("{} active API keys", keys.len())),
        Err(error) => DoctorCheck::fail("api_keys", format!("failed to list API keys: {error}")),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
