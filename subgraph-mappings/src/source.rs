//! Trigger files: one JSON trigger per line.
//!
//! ```text
//! {"type":"log","address":"0x..","name":"LogAddAsset","block":{..},"transaction":{..},"log_index":0,"params":[..]}
//! {"type":"block","number":12,"timestamp":1600000000}
//! ```
//!
//! Lines are parsed in full before anything is processed, so a malformed
//! file never leaves a partial replay behind.

use std::cmp::Ordering;
use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use subgraph::{Cursor, Trigger};

/// Parse NDJSON triggers. Blank lines are skipped.
///
/// # Errors
///
/// Returns an error naming the 1-based line that failed to read or parse.
pub fn parse(reader: impl BufRead) -> Result<Vec<Trigger>> {
    let mut triggers = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let number = index + 1;
        let line = line.with_context(|| format!("reading line {number}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let trigger = serde_json::from_str(&line).with_context(|| format!("parsing line {number}"))?;
        triggers.push(trigger);
    }
    Ok(triggers)
}

/// Read triggers from a file, ordered by position and with everything
/// `cursor` already consumed dropped.
///
/// The sort is stable: triggers sharing a position keep their file order,
/// and the first `cursor.consumed` of those at the cursor position are the
/// ones dropped.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or a line cannot be parsed.
pub fn load(path: &Path, cursor: Option<Cursor>) -> Result<Vec<Trigger>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut triggers =
        parse(std::io::BufReader::new(file)).with_context(|| format!("reading {}", path.display()))?;
    triggers.sort_by_key(Trigger::position);

    if let Some(cursor) = cursor {
        let before = triggers.len();
        let mut at_cursor = 0;
        triggers.retain(|t| match t.position().cmp(&cursor.position) {
            Ordering::Less => false,
            Ordering::Equal => {
                at_cursor += 1;
                at_cursor > cursor.consumed
            }
            Ordering::Greater => true,
        });
        tracing::info!(%cursor, skipped = before - triggers.len(), "resuming after cursor");
    }
    Ok(triggers)
}
