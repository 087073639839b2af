use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

pub const DEMO_BUSINESS_ID: &str = "biz-demo-001";
pub const DEMO_PIPELINE_ID: &str = "pipe-demo-001";
pub const DEMO_CHANNEL_ID: &str = "109876543210";
pub const DEMO_DISABLED_CHANNEL_ID: &str = "109876543299";
pub const DEMO_INPUT_STAGE_ID: &str = "stage-demo-new";
pub const DEMO_OPEN_LEAD_ID: &str = "lead-demo-open";
pub const DEMO_OPEN_LEAD_PHONE: &str = "5511988887777";
pub const DEMO_EMPLOYEE_ID: &str = "emp-demo-001";
pub const DEMO_API_KEY: &str = "lk_demo_0001";

const DEMO_STAGE_COUNT: i64 = 4;

/// Deterministic demo CRM: one business with an enabled and a disabled WhatsApp pipeline, a
/// four-stage funnel, an open and a closed lead, a calendar connection and API keys.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            business_id: DEMO_BUSINESS_ID,
            pipeline_id: DEMO_PIPELINE_ID,
            channel_id: DEMO_CHANNEL_ID,
            api_key: DEMO_API_KEY,
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let business: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM business WHERE id = ?1)")
            .bind(DEMO_BUSINESS_ID)
            .fetch_one(pool)
            .await?;
        checks.push(("business", business == 1));

        let pipeline: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM pipeline
                           WHERE id = ?1 AND whatsapp_phone_number_id = ?2 AND whatsapp_enabled = 1)",
        )
        .bind(DEMO_PIPELINE_ID)
        .bind(DEMO_CHANNEL_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("enabled-pipeline", pipeline == 1));

        let stages: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM pipeline_stage WHERE pipeline_id = ?1")
                .bind(DEMO_PIPELINE_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("stage-count", stages == DEMO_STAGE_COUNT));

        let input_stages: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM pipeline_stage WHERE pipeline_id = ?1 AND is_input = 1",
        )
        .bind(DEMO_PIPELINE_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("single-input-stage", input_stages == 1));

        let open_leads: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM lead WHERE phone_number = ?1 AND closed_at IS NULL",
        )
        .bind(DEMO_OPEN_LEAD_PHONE)
        .fetch_one(pool)
        .await?;
        checks.push(("open-lead", open_leads == 1));

        let connection: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM oauth_connection WHERE employee_id = ?1)",
        )
        .bind(DEMO_EMPLOYEE_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("calendar-connection", connection == 1));

        let api_key: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM api_key WHERE key = ?1 AND active = 1)")
                .bind(DEMO_API_KEY)
                .fetch_one(pool)
                .await?;
        checks.push(("api-key", api_key == 1));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo rows; cascades take pipelines, stages and leads with the business.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM lead WHERE pipeline_id IN (SELECT id FROM pipeline WHERE business_id = ?1)")
            .bind(DEMO_BUSINESS_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM business WHERE id = ?1")
            .bind(DEMO_BUSINESS_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM oauth_connection WHERE employee_id = ?1")
            .bind(DEMO_EMPLOYEE_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM api_key WHERE key LIKE 'lk_demo_%'").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedResult {
    pub business_id: &'static str,
    pub pipeline_id: &'static str,
    pub channel_id: &'static str,
    pub api_key: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl VerificationResult {
    pub fn failed_checks(&self) -> Vec<&'static str> {
        self.checks.iter().filter(|(_, ok)| !*ok).map(|(name, _)| *name).collect()
    }
}
