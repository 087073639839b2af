use crate::commands::{load_config, runtime, CommandResult};
use leadline_core::config::DatabaseConfig;
use leadline_db::{connect, migrations, DemoSeedDataset, SeedResult, VerificationResult};

/// Reloads the demo dataset from scratch, so repeated runs converge on the same rows.
/// With `clean_only` the dataset is removed and nothing is loaded.
pub fn run(clean_only: bool) -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(reseed(&config.database, clean_only));

    match result {
        Ok(Some(seeded)) => CommandResult::success("seed", summary(&seeded)),
        Ok(None) => CommandResult::success("seed", "demo dataset removed"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

type Failure = (&'static str, String, u8);

async fn reseed(
    database: &DatabaseConfig,
    clean_only: bool,
) -> Result<Option<SeedResult>, Failure> {
    let pool =
        connect(database).await.map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), 5u8))?;

    DemoSeedDataset::clean(&pool)
        .await
        .map_err(|error| ("seed_cleanup", error.to_string(), 5u8))?;

    if clean_only {
        pool.close().await;
        return Ok(None);
    }

    let seeded = DemoSeedDataset::load(&pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

    let verification = DemoSeedDataset::verify(&pool)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

    pool.close().await;
    if verification.all_present {
        Ok(Some(seeded))
    } else {
        Err(("seed_verification", verification_message(&verification), 6u8))
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo dataset loaded:\n  - business: {}\n  - pipeline: {} (channel {})\n  - api key: {}",
        seeded.business_id, seeded.pipeline_id, seeded.channel_id, seeded.api_key
    )
}

fn verification_message(verification: &VerificationResult) -> String {
    let failed_checks = verification.failed_checks();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
