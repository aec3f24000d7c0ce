//! Общие помощники CLI-команд.

use anyhow::Result;
use std::path::Path;

use CryoVault::Snapshot;

/// Открыть снапшот: с machine-гейтом, если тег задан, иначе unchecked
/// (magic проверяется в обоих случаях).
pub fn open_any(path: &Path, machine: Option<&str>) -> Result<Snapshot<'static>> {
    let snap = match machine {
        Some(m) => Snapshot::open(path, m)?,
        None => Snapshot::open_unchecked(path)?,
    };
    Ok(snap)
}

pub fn escape_json(s: &str) -> String {
    // простая экранизация: заменим \ и " (достаточно для наших целей)
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}
