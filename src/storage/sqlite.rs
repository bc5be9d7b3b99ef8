//! SQLite replica repository.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

use super::schema::{Pessoas, CREATE_PESSOAS_TABLE};
use super::Result;
use crate::replication::{PersonDto, PersonRecord, ReplicaRepository};

/// SQLite implementation of the people replica.
pub struct SqlitePersonRepository {
    pool: SqlitePool,
}

impl SqlitePersonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_PESSOAS_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

/// Fixed-width UTC text, so SQL string comparison orders versions correctly.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
        .transpose()
        .map_err(Into::into)
}

#[async_trait]
impl ReplicaRepository<PersonDto> for SqlitePersonRepository {
    type Record = PersonRecord;

    async fn create_or_update(&self, dto: &PersonDto) -> Result<Option<PersonRecord>> {
        let replicated_at = format_timestamp(Utc::now());

        // Conflicting rows are only overwritten by an equal or newer version.
        let not_stale = Expr::col((Pessoas::Table, Pessoas::UpdatedAt))
            .is_null()
            .or(Expr::cust("excluded.updated_at IS NULL"))
            .or(Expr::cust("excluded.updated_at >= pessoas.updated_at"));

        let query = Query::insert()
            .into_table(Pessoas::Table)
            .columns([
                Pessoas::Id,
                Pessoas::Nome,
                Pessoas::Email,
                Pessoas::UpdatedAt,
                Pessoas::ReplicatedAt,
            ])
            .values_panic([
                dto.id.as_str().into(),
                dto.name.as_str().into(),
                dto.email.clone().into(),
                dto.updated_at.map(format_timestamp).into(),
                replicated_at.into(),
            ])
            .on_conflict(
                OnConflict::column(Pessoas::Id)
                    .update_columns([
                        Pessoas::Nome,
                        Pessoas::Email,
                        Pessoas::UpdatedAt,
                        Pessoas::ReplicatedAt,
                    ])
                    .action_and_where(not_stale)
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(PersonRecord::from(dto)))
    }

    async fn find_by_identifier(&self, id: &str) -> Result<Option<PersonRecord>> {
        let query = Query::select()
            .columns([Pessoas::Id, Pessoas::Nome, Pessoas::Email, Pessoas::UpdatedAt])
            .from(Pessoas::Table)
            .and_where(Expr::col(Pessoas::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let Some(row) = sqlx::query(&query).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };

        Ok(Some(PersonRecord {
            id: row.try_get("id")?,
            name: row.try_get("nome")?,
            email: row.try_get("email")?,
            updated_at: parse_timestamp(row.try_get("updated_at")?)?,
        }))
    }
}
