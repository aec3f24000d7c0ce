use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::util::open_any;

pub fn exec(path: PathBuf, module: String, out: PathBuf) -> Result<()> {
    let mut snap = open_any(&path, None)?;

    let mut m = snap
        .open_module(&module)
        .with_context(|| format!("open module {}", module))?;
    let (major, minor) = (m.major(), m.minor());
    let size = m.size() as usize;
    let mut payload = vec![0u8; size];
    m.read_u8_array(&mut payload)
        .with_context(|| format!("read payload of {}", module))?;
    m.close().context("close module")?;
    snap.close().context("close snapshot")?;

    fs::write(&out, &payload).with_context(|| format!("write {}", out.display()))?;
    println!(
        "extracted {} v{}.{} ({} B) -> {}",
        module,
        major,
        minor,
        size,
        out.display()
    );
    Ok(())
}
