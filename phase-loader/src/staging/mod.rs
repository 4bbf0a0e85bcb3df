//! Staged CSV output: narrow rows land in numbered chunk files that get
//! merged into a single upload file later.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};

/// Chunk files use `;` so values never collide with the separator.
pub const FIELD_SEPARATOR: u8 = b';';

/// Path of chunk `index` under `dir`: `<stem><index>.csv`.
pub fn chunk_path(dir: &Path, stem: &str, index: usize) -> PathBuf {
    dir.join(format!("{stem}{index}.csv"))
}

/// Numeric suffix of a chunk file name, `None` when the name does not match
/// `<stem><index>.csv`.
fn chunk_index(name: &str, stem: &str) -> Option<usize> {
    name.strip_prefix(stem)?.strip_suffix(".csv")?.parse().ok()
}

/// Chunk files under `dir` ordered by numeric suffix, so `<stem>2.csv` comes
/// before `<stem>10.csv`. Names that do not match the pattern are ignored.
pub fn sorted_chunks(dir: &Path, stem: &str) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read staging dir {}", dir.display()))?;

    let mut chunks: Vec<(usize, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(index) = chunk_index(name, stem) {
            chunks.push((index, entry.path()));
        }
    }
    chunks.sort_by_key(|(index, _)| *index);

    Ok(chunks.into_iter().map(|(_, path)| path).collect())
}

/// Concatenates every chunk into `output`, keeping the header line of the
/// first file and skipping it in the rest. Returns how many files went in.
pub fn join_chunks(dir: &Path, stem: &str, output: &Path) -> anyhow::Result<usize> {
    let chunks = sorted_chunks(dir, stem)?;
    if chunks.is_empty() {
        bail!("no chunk files matching {stem}*.csv in {}", dir.display());
    }

    let out = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(out);

    for (i, chunk) in chunks.iter().enumerate() {
        let file =
            File::open(chunk).with_context(|| format!("failed to open {}", chunk.display()))?;
        let mut reader = BufReader::new(file);
        if i != 0 {
            let mut header = String::new();
            reader.read_line(&mut header)?;
        }
        io::copy(&mut reader, &mut writer)?;
    }
    writer.flush()?;

    Ok(chunks.len())
}

/// Data-row count per chunk (header excluded), in join order.
pub fn chunk_row_counts(dir: &Path, stem: &str) -> anyhow::Result<Vec<(PathBuf, usize)>> {
    let mut counts = Vec::new();
    for chunk in sorted_chunks(dir, stem)? {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(FIELD_SEPARATOR)
            .from_path(&chunk)
            .with_context(|| format!("failed to open {}", chunk.display()))?;
        let mut rows = 0usize;
        for record in rdr.records() {
            record?;
            rows += 1;
        }
        counts.push((chunk, rows));
    }
    Ok(counts)
}
