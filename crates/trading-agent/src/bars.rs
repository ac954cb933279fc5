use std::path::{Path, PathBuf};

use analysis_core::Bar;
use anyhow::{bail, Context, Result};

/// Loads daily bars from a `.json` array or a `.csv` file with a
/// `date,open,high,low,close,volume` header. Bars come back sorted by date.
pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let mut bars = match extension.as_str() {
        "json" => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<Vec<Bar>>(&raw)
                .with_context(|| format!("parsing bars from {}", path.display()))?
        }
        "csv" => {
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_path(path)
                .with_context(|| format!("opening {}", path.display()))?;
            reader
                .deserialize::<Bar>()
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("parsing bars from {}", path.display()))?
        }
        other => bail!("unsupported bar file extension '{}' (expected .json or .csv)", other),
    };

    if bars.is_empty() {
        bail!("{} holds no bars", path.display());
    }

    bars.sort_by_key(|b| b.date);
    tracing::info!(
        "Loaded {} bars from {} ({} to {})",
        bars.len(),
        path.display(),
        bars[0].date,
        bars[bars.len() - 1].date
    );
    Ok(bars)
}

/// `DIR/<TICKER>.csv`, falling back to `DIR/<TICKER>.json`.
pub fn ticker_bars_path(dir: &Path, ticker: &str) -> Result<PathBuf> {
    for extension in ["csv", "json"] {
        let path = dir.join(format!("{}.{}", ticker, extension));
        if path.is_file() {
            return Ok(path);
        }
    }
    bail!("no {}.csv or {}.json in {}", ticker, ticker, dir.display())
}
