use anyhow::{bail, Result};
use phase_loader::{config::AppConfig, observability, staging};
use std::{env, path::Path};

fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: join_phase_chunks <output_path>");
    }
    let output = Path::new(&args[1]);

    let cfg = AppConfig::load()?;
    let staging_cfg = &cfg.staging;

    let mut total = 0usize;
    for (path, rows) in staging::chunk_row_counts(&staging_cfg.dir, &staging_cfg.file_stem)? {
        tracing::info!(chunk = %path.display(), rows, "chunk ready");
        total += rows;
    }

    let files = staging::join_chunks(&staging_cfg.dir, &staging_cfg.file_stem, output)?;
    tracing::info!(files, total_rows = total, output = %output.display(), "chunks joined");

    Ok(())
}
