//! Log command implementation.

use super::{emit, CliResult, Format};
use serde::Serialize;
use std::path::Path;

/// Message log excerpt.
#[derive(Debug, Serialize)]
pub struct LogExcerpt {
    /// Log file location.
    pub path: String,
    /// Size of the whole log in bytes.
    pub size: u64,
    /// Entries, oldest first. Cause lines stay attached to their entry.
    pub entries: Vec<String>,
}

/// Reads the last `tail` entries of the message log in `store_dir`.
pub fn read(store_dir: &Path, tail: Option<usize>) -> CliResult<LogExcerpt> {
    let path = store_dir.join("messages.log");
    let contents = std::fs::read_to_string(&path)?;
    let mut entries = split_entries(&contents);
    if let Some(tail) = tail {
        let skip = entries.len().saturating_sub(tail);
        entries.drain(..skip);
    }
    Ok(LogExcerpt {
        path: path.display().to_string(),
        size: contents.len() as u64,
        entries,
    })
}

/// Groups `caused by` continuation lines with the entry they belong to.
fn split_entries(contents: &str) -> Vec<String> {
    let mut entries: Vec<String> = Vec::new();
    for line in contents.lines() {
        match entries.last_mut() {
            Some(entry) if line.starts_with("  ") => {
                entry.push('\n');
                entry.push_str(line);
            }
            _ if line.is_empty() => {}
            _ => entries.push(line.to_string()),
        }
    }
    entries
}

/// Runs the log command.
pub fn run(store_dir: &Path, tail: Option<usize>, format: Format) -> CliResult<()> {
    let excerpt = read(store_dir, tail)?;
    emit(format, &excerpt, |excerpt| {
        println!("{} ({} bytes)", excerpt.path, excerpt.size);
        for entry in &excerpt.entries {
            println!("{entry}");
        }
    })
}
