use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use leadline_core::domain::lead::{Lead, LeadId};
use leadline_core::domain::pipeline::{PipelineId, StageId};
use leadline_core::domain::EmployeeId;

use super::{decode_err, parse_timestamp, LeadRepository, RepositoryError};
use crate::DbPool;

const LEAD_COLUMNS: &str = "id, pipeline_id, stage_id, customer_name, phone_number, email, \
                            conversation_id, value, employee_id, closed_at, created_at, updated_at";

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_lead(row: &sqlx::sqlite::SqliteRow) -> Result<Lead, RepositoryError> {
    let value: String = row.try_get("value").map_err(decode_err)?;
    let employee_id: Option<String> = row.try_get("employee_id").map_err(decode_err)?;
    let closed_at: Option<String> = row.try_get("closed_at").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(Lead {
        id: LeadId(row.try_get("id").map_err(decode_err)?),
        pipeline_id: PipelineId(row.try_get("pipeline_id").map_err(decode_err)?),
        stage_id: StageId(row.try_get("stage_id").map_err(decode_err)?),
        customer_name: row.try_get("customer_name").map_err(decode_err)?,
        phone_number: row.try_get("phone_number").map_err(decode_err)?,
        email: row.try_get("email").map_err(decode_err)?,
        conversation_id: row.try_get("conversation_id").map_err(decode_err)?,
        value: Decimal::from_str(&value)
            .map_err(|error| RepositoryError::Decode(format!("value: {error}")))?,
        employee_id: employee_id.map(EmployeeId),
        closed_at: closed_at.as_deref().map(|raw| parse_timestamp("closed_at", raw)).transpose()?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl LeadRepository for SqlLeadRepository {
    async fn count_open_by_phone(&self, phone_number: &str) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM lead WHERE phone_number = ? AND closed_at IS NULL",
        )
        .bind(phone_number)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn find_open_by_phone(&self, phone_number: &str) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM lead
             WHERE phone_number = ? AND closed_at IS NULL
             ORDER BY created_at ASC
             LIMIT 1"
        ))
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_lead).transpose()
    }

    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM lead WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_lead).transpose()
    }

    async fn insert(&self, lead: Lead) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO lead (id, pipeline_id, stage_id, customer_name, phone_number, email,
                               conversation_id, value, employee_id, closed_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.id.0)
        .bind(&lead.pipeline_id.0)
        .bind(&lead.stage_id.0)
        .bind(&lead.customer_name)
        .bind(&lead.phone_number)
        .bind(&lead.email)
        .bind(&lead.conversation_id)
        .bind(lead.value.to_string())
        .bind(lead.employee_id.as_ref().map(|id| id.0.as_str()))
        .bind(lead.closed_at.map(|at| at.to_rfc3339()))
        .bind(lead.created_at.to_rfc3339())
        .bind(lead.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::Conflict(format!(
                    "an open lead already exists for phone `{}`",
                    lead.phone_number.as_deref().unwrap_or_default()
                )))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn update_stage(
        &self,
        id: &LeadId,
        stage_id: &StageId,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE lead SET stage_id = ?, updated_at = ? WHERE id = ?")
            .bind(&stage_id.0)
            .bind(updated_at.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
