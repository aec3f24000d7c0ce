use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use CryoVault::Snapshot;

// Генератор уникальных временных директорий для тестов
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("cvtest-{prefix}-{pid}-{t}-{id}"))
}

// Один и тот же протокол записи для любого бэкенда.
fn write_state(snap: &mut Snapshot<'_>) {
    let mut bank0 = snap.create_module("BANK0", 1, 0).expect("create BANK0");
    bank0.write_u8_array(&[0x11; 13]).expect("bytes");
    bank0.write_u16_array(&[1, 2, 3]).expect("words");
    bank0.write_padded_string("tag", 8, 0).expect("padded tag");
    bank0.write_string(None).expect("absent comment");
    assert_eq!(bank0.size(), 13 + 6 + 8 + 2);
    bank0.close().expect("close BANK0");

    let mut bank1 = snap.create_module("BANK1", 1, 0).expect("create BANK1");
    bank1.write_f64(1_234_567.5).expect("clock");
    bank1.close().expect("close BANK1");
}

#[test]
fn probe_size_matches_real_backends() {
    // Probe: без хранения, только счёт
    let mut probe = Snapshot::create_probe(1, 0, "SIZER").expect("create probe");
    write_state(&mut probe);
    let probed = probe.position().expect("probed size");
    probe.close().expect("close probe");

    // Буфер, выделенный ровно по probe-результату, вмещает снапшот впритык
    let mut buf = vec![0u8; probed as usize];
    let mut mem = Snapshot::create_in_buffer(&mut buf, 1, 0, "SIZER").expect("create in buffer");
    write_state(&mut mem);
    assert_eq!(mem.position().expect("mem size"), probed);
    mem.close().expect("close mem");

    // Файл того же протокола совпадает байт в байт по длине
    let root = unique_root("probe");
    fs::create_dir_all(&root).expect("create root dir");
    let path = root.join("state.cvs");
    let mut snap = Snapshot::create(&path, 1, 0, "SIZER").expect("create file");
    write_state(&mut snap);
    snap.close().expect("close file");
    assert_eq!(fs::metadata(&path).expect("metadata").len(), probed);

    // Результат probe читается обратно из буфера
    let mut back = Snapshot::open_from_bytes(&buf, "SIZER").expect("open buffer");
    let mods = back.list_modules().expect("list modules");
    assert_eq!(mods.len(), 2);
    assert_eq!(mods[0].name, "BANK0");
    assert_eq!(mods[0].size, 29);
    assert_eq!(mods[1].name, "BANK1");
    assert_eq!(mods[1].size, 8);
    back.close().expect("close");
}
