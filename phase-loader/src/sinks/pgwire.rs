use phase_client::domain::PhaseRow;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};

use super::upload::{BatchUploadSink, InsertBackend};

/// Upload sink speaking the database wire protocol directly, for
/// deployments where the REST layer is bypassed.
pub type PgwireUploadSink = BatchUploadSink<PgwireBackend>;

pub struct PgwireBackend {
    pool: PgPool,
}

impl PgwireBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn build_insert<'args>(table: &str, rows: &'args [PhaseRow]) -> QueryBuilder<'args, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO {table} (current, voltage, active_power, power_factor, frequency, \
         total_active_energy, total_active_returned_energy, apparent_power, device, \
         phase_type, ts, price_realtime) "
    ));

    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.current)
            .push_bind(row.voltage)
            .push_bind(row.active_power)
            .push_bind(row.power_factor)
            .push_bind(row.frequency)
            .push_bind(row.total_active_energy)
            .push_bind(row.total_active_returned_energy)
            .push_bind(row.apparent_power)
            .push_bind(row.device)
            .push_bind(row.phase_type)
            .push_bind(row.ts)
            .push_bind(row.price_realtime);
    });

    builder
}

#[async_trait::async_trait]
impl InsertBackend for PgwireBackend {
    async fn insert(&self, table: &str, rows: &[PhaseRow]) -> anyhow::Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut builder = build_insert(table, rows);
        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}
