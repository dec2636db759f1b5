use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Finds the accepted outputs for `test_file`: `<stem>_result.txt` first, then
/// every `<stem>_result*.txt` alternate in name order.
pub fn find_expected_files(test_file: &Path) -> Result<Vec<PathBuf>> {
    let stem = file_stem(test_file);
    let dir = match test_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let primary = format!("{stem}_result.txt");
    let prefix = format!("{stem}_result");

    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {dir:?}"))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !(name.starts_with(&prefix) && name.ends_with(".txt")) {
            continue;
        }
        let path = entry.path();
        if path.is_file() && path.file_name() != test_file.file_name() {
            found.push((name != primary, name, path));
        }
    }
    found.sort();
    found.dedup_by(|a, b| a.1 == b.1);
    Ok(found.into_iter().map(|(_, _, path)| path).collect())
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
