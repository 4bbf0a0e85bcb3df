//! Query helpers for operators talking straight to the hosted database's
//! Postgres port instead of the REST API.
//!
//! The table name comes from configuration, so it is interpolated rather
//! than bound; it is never user input.

use anyhow::Result;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::domain::PhaseRow;

/// Fetch every phase row recorded strictly before `cutoff`, oldest first.
pub async fn fetch_before(
    pool: &PgPool,
    table: &str,
    cutoff: PrimitiveDateTime,
) -> Result<Vec<PhaseRow>> {
    let sql = format!(
        r#"
        SELECT
            current,
            voltage,
            active_power,
            power_factor,
            frequency,
            total_active_energy,
            total_active_returned_energy,
            apparent_power,
            device,
            phase_type,
            ts,
            price_realtime
        FROM {table}
        WHERE ts < $1
        ORDER BY ts
        "#
    );

    let rows = sqlx::query_as::<_, PhaseRow>(&sql)
        .bind(cutoff)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Total number of rows currently in the table.
pub async fn count_rows(pool: &PgPool, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(pool).await?;
    Ok(count)
}

/// Delete every row recorded strictly before `cutoff`. Returns the number of
/// rows removed.
pub async fn delete_before(pool: &PgPool, table: &str, cutoff: PrimitiveDateTime) -> Result<u64> {
    let sql = format!("DELETE FROM {table} WHERE ts < $1");
    let result = sqlx::query(&sql).bind(cutoff).execute(pool).await?;
    Ok(result.rows_affected())
}
