use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;

use CryoVault::consts::MODULE_HDR_SIZE;

use crate::util::{escape_json, open_any};

pub fn exec(path: PathBuf, machine: Option<String>, json: bool) -> Result<()> {
    let mut snap = open_any(&path, machine.as_deref())?;
    let stream_len = snap.stream_len().context("stream length")?;
    let modules = snap.list_modules().context("list modules")?;

    let mut problems: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut chain_end = snap.first_module_offset();

    for m in &modules {
        if !seen.insert(m.name.as_str()) {
            problems.push(format!("duplicate module name {}", m.name));
        }
        match m
            .offset
            .checked_add(MODULE_HDR_SIZE as u64)
            .and_then(|e| e.checked_add(m.size as u64))
        {
            Some(end) => {
                if end > stream_len {
                    problems.push(format!(
                        "module {}: declared region [{}..{}) overruns stream ({} B)",
                        m.name, m.offset, end, stream_len
                    ));
                }
                chain_end = end;
            }
            None => {
                problems.push(format!(
                    "module {}: declared size {} overflows offsets",
                    m.name, m.size
                ));
                chain_end = stream_len;
            }
        }
    }
    if chain_end < stream_len {
        problems.push(format!(
            "{} trailing bytes after module chain (truncated header or garbage)",
            stream_len - chain_end
        ));
    }

    if json {
        print!("{{");
        print!("\"file\":\"{}\",", escape_json(snap.display_name()));
        print!("\"machine\":\"{}\",", escape_json(snap.machine()));
        print!("\"stream_len\":{},", stream_len);
        print!("\"modules_total\":{},", modules.len());
        print!("\"problems\":[");
        for (i, p) in problems.iter().enumerate() {
            if i > 0 {
                print!(",");
            }
            print!("\"{}\"", escape_json(p));
        }
        print!("],");
        print!("\"ok\":{}", problems.is_empty());
        println!("}}");
    } else {
        println!("Verify report {}:", snap.display_name());
        println!("  machine        = {}", snap.machine());
        println!("  stream_len     = {} B", stream_len);
        println!("  modules_total  = {}", modules.len());
        println!("  problems       = {}", problems.len());
        for p in &problems {
            println!("  ! {}", p);
        }
        println!(
            "  verdict        = {}",
            if problems.is_empty() { "ok" } else { "CORRUPT" }
        );
    }

    snap.close().context("close snapshot")?;
    if !problems.is_empty() {
        bail!(
            "snapshot {} failed verification ({} problems)",
            path.display(),
            problems.len()
        );
    }
    Ok(())
}
