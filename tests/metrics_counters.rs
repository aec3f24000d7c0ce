// tests/metrics_counters.rs
//
// Покрываем:
// - Metrics: snapshot/reset и базовые инкременты после операций контейнера.
// - legacy_opens тикает только на файлах без version sub-header.
//
// Счётчики глобальные, поэтому все фазы живут в одном тесте.
//
// Запуск:
//   cargo test --test metrics_counters -- --nocapture

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use CryoVault::consts::{SNAPSHOT_MACHINE_LEN, SNAPSHOT_MAGIC};
use CryoVault::{metrics, Snapshot};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("cvtest-metrics-{prefix}-{pid}-{t}-{id}"))
}

#[test]
fn metrics_snapshot_and_reset() {
    metrics::reset();

    let root = unique_root("m1");
    fs::create_dir_all(&root).expect("create root dir");
    let path = root.join("state.cvs");

    {
        let mut snap = Snapshot::create(&path, 1, 0, "TESTMACH").expect("create snapshot");
        let mut m = snap.create_module("CPU", 1, 0).expect("create CPU");
        m.write_u32(1).expect("write");
        m.write_u16(2).expect("write");
        m.close().expect("close CPU");
        snap.close().expect("close snapshot");
    }
    {
        let mut snap = Snapshot::open(&path, "TESTMACH").expect("open snapshot");
        let mut m = snap.open_module("CPU").expect("open CPU");
        let _ = m.read_u32().expect("read");
        m.close().expect("close CPU");
        snap.close().expect("close snapshot");
    }

    let m = metrics::snapshot();
    assert_eq!(m.snapshots_created, 1);
    assert_eq!(m.snapshots_opened, 1);
    assert_eq!(m.modules_created, 1);
    assert_eq!(m.modules_opened, 1);
    assert_eq!(m.payload_bytes_written, 6, "u32 + u16 payload");
    assert_eq!(m.payload_bytes_read, 4, "only the u32 was read back");
    assert_eq!(m.legacy_opens, 0, "modern snapshot is not a legacy open");
    assert!(m.avg_module_payload_written() > 0.0);

    // Контейнер старого образца (только primary header) тикает legacy_opens
    let mut bytes = Vec::new();
    bytes.extend_from_slice(SNAPSHOT_MAGIC);
    bytes.push(1);
    bytes.push(0);
    bytes.extend_from_slice(&[0u8; SNAPSHOT_MACHINE_LEN]);
    let snap = Snapshot::open_from_bytes_unchecked(&bytes).expect("open legacy");
    assert!(snap.producer().is_none());
    snap.close().expect("close snapshot");
    assert_eq!(metrics::snapshot().legacy_opens, 1);

    // reset
    metrics::reset();
    let z = metrics::snapshot();
    assert_eq!(z.snapshots_created, 0);
    assert_eq!(z.snapshots_opened, 0);
    assert_eq!(z.legacy_opens, 0);
    assert_eq!(z.modules_created, 0);
    assert_eq!(z.modules_opened, 0);
    assert_eq!(z.payload_bytes_written, 0);
    assert_eq!(z.payload_bytes_read, 0);
}
