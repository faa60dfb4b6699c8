use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use raterbot_core::domain::lead::{LeadId, LeadRecord};

use super::{LeadRepository, RepositoryError};
use crate::DbPool;

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_lead(row: &sqlx::sqlite::SqliteRow) -> Result<LeadRecord, RepositoryError> {
    let age: i64 = decode(row, "age")?;
    let face_amount: i64 = decode(row, "face_amount")?;
    let flat_extra: String = decode(row, "flat_extra")?;
    let created_at: String = decode(row, "created_at")?;

    let flat_extra = Decimal::from_str(&flat_extra)
        .map_err(|e| RepositoryError::Decode(format!("flat_extra: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("created_at: {e}")))?;

    Ok(LeadRecord {
        id: LeadId(decode(row, "id")?),
        recipient: decode(row, "recipient")?,
        state: decode(row, "state")?,
        age: u32::try_from(age).map_err(|e| RepositoryError::Decode(format!("age: {e}")))?,
        gender: decode(row, "gender")?,
        face_amount: u64::try_from(face_amount)
            .map_err(|e| RepositoryError::Decode(format!("face_amount: {e}")))?,
        product: decode(row, "product")?,
        mode: decode(row, "mode")?,
        quote_result: decode(row, "quote_result")?,
        table_rating: decode(row, "table_rating")?,
        flat_extra,
        created_at,
    })
}

#[async_trait::async_trait]
impl LeadRepository for SqlLeadRepository {
    async fn append(&self, lead: LeadRecord) -> Result<(), RepositoryError> {
        let face_amount = i64::try_from(lead.face_amount)
            .map_err(|e| RepositoryError::Decode(format!("face_amount: {e}")))?;

        sqlx::query(
            "INSERT INTO quote_lead
                (id, recipient, state, age, gender, face_amount, product, mode,
                 quote_result, table_rating, flat_extra, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.id.0)
        .bind(&lead.recipient)
        .bind(&lead.state)
        .bind(i64::from(lead.age))
        .bind(&lead.gender)
        .bind(face_amount)
        .bind(&lead.product)
        .bind(&lead.mode)
        .bind(&lead.quote_result)
        .bind(&lead.table_rating)
        .bind(lead.flat_extra.to_string())
        .bind(lead.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<LeadRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, recipient, state, age, gender, face_amount, product, mode,
                    quote_result, table_rating, flat_extra, created_at
             FROM quote_lead
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_lead).collect::<Result<Vec<_>, _>>()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM quote_lead")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = decode(&row, "count")?;
        Ok(count.max(0) as u64)
    }
}
