use anyhow::{bail, Context, Result};
use phase_client::{
    db::phase_queries,
    domain::{ts_format, PhaseRow},
    rest::RestTableClient,
};
use phase_loader::{
    config::{AppConfig, SinkKind},
    observability,
};
use sqlx::postgres::PgPoolOptions;
use std::env;
use time::{macros::format_description, Date, PrimitiveDateTime};

fn parse_cutoff(s: &str) -> Result<PrimitiveDateTime> {
    if let Ok(dt) = ts_format::parse_flexible(s) {
        return Ok(dt);
    }
    let date = Date::parse(s, format_description!("[year]-[month]-[day]")).with_context(|| {
        format!("invalid cutoff '{s}', expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS")
    })?;
    Ok(date.midnight())
}

fn log_summary(rows: &[PhaseRow]) {
    match rows.last() {
        Some(last) => tracing::info!(
            count = rows.len(),
            last_ts = %ts_format::format(last.ts),
            "fetched phase rows"
        ),
        None => tracing::info!("no phase rows before the cutoff"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: fetch_phase_rows <cutoff>");
    }
    let cutoff = parse_cutoff(&args[1])?;

    let cfg = AppConfig::load()?;
    let table = &cfg.store.table;

    match cfg.sink.kind {
        SinkKind::Rest => {
            let (Some(rest_url), Some(api_key)) = (&cfg.store.rest_url, &cfg.store.api_key)
            else {
                bail!("store.rest_url and store.api_key are required for the rest sink");
            };
            let client = RestTableClient::new(rest_url.clone(), api_key.clone())?;
            let rows: Vec<PhaseRow> = client.fetch_rows_before(table, "ts", cutoff).await?;
            log_summary(&rows);
        }
        SinkKind::Pgwire => {
            let Some(pg_uri) = &cfg.store.pg_uri else {
                bail!("store.pg_uri is required for the pgwire sink");
            };
            let pool = PgPoolOptions::new()
                .max_connections(cfg.store.max_connections)
                .connect(pg_uri)
                .await?;
            let rows = phase_queries::fetch_before(&pool, table, cutoff).await?;
            log_summary(&rows);
            let total = phase_queries::count_rows(&pool, table).await?;
            tracing::info!(total, %table, "rows currently in the table");
        }
    }

    Ok(())
}
