use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::util::{escape_json, open_any};

pub fn exec(path: PathBuf, machine: Option<String>, json: bool) -> Result<()> {
    let mut snap = open_any(&path, machine.as_deref())?;
    let stream_len = snap.stream_len().context("stream length")?;
    let modules = snap.list_modules().context("list modules")?;

    if json {
        print!("{{");
        print!("\"file\":\"{}\",", escape_json(snap.display_name()));
        print!("\"machine\":\"{}\",", escape_json(snap.machine()));
        print!("\"major\":{},", snap.major());
        print!("\"minor\":{},", snap.minor());
        match snap.producer() {
            Some(p) => print!(
                "\"producer\":{{\"version\":\"{}.{}.{}\",\"revision\":{}}},",
                p.version[0], p.version[1], p.version[2], p.revision
            ),
            None => print!("\"producer\":null,"),
        }
        print!("\"stream_len\":{},", stream_len);
        print!("\"modules\":[");
        for (i, m) in modules.iter().enumerate() {
            if i > 0 {
                print!(",");
            }
            print!(
                "{{\"name\":\"{}\",\"major\":{},\"minor\":{},\"size\":{},\"offset\":{}}}",
                escape_json(&m.name),
                m.major,
                m.minor,
                m.size,
                m.offset
            );
        }
        print!("]");
        println!("}}");
        snap.close().context("close snapshot")?;
        return Ok(());
    }

    println!("Snapshot {}", snap.display_name());
    println!("  machine     = {}", snap.machine());
    println!("  version     = {}.{}", snap.major(), snap.minor());
    match snap.producer() {
        Some(p) => println!("  producer    = {}", p),
        None => println!("  producer    = (legacy, no version record)"),
    }
    println!("  stream_len  = {} B", stream_len);
    println!("Modules ({}):", modules.len());
    for m in &modules {
        println!(
            "  {:<16} v{}.{}  {:>10} B  @ {}",
            m.name, m.major, m.minor, m.size, m.offset
        );
    }
    snap.close().context("close snapshot")?;
    Ok(())
}
