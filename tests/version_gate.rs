use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{ByteOrder, LittleEndian};

use CryoVault::consts::{ENGINE_REVISION, ENGINE_VERSION, MODULE_NAME_LEN, SNAPSHOT_MACHINE_LEN, SNAPSHOT_MAGIC};
use CryoVault::{Snapshot, SnapshotErrorKind};

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

fn gated_snapshot(path: &PathBuf) {
    let mut snap = Snapshot::create(path, 1, 0, "TESTMACH").expect("create snapshot");
    let mut vic = snap.create_module("VIC", 2, 5).expect("create VIC");
    vic.write_u8(1).expect("write VIC");
    vic.close().expect("close VIC");
    let mut sid = snap.create_module("SID", 1, 0).expect("create SID");
    sid.write_u8(2).expect("write SID");
    sid.close().expect("close SID");
    snap.close().expect("close snapshot");
}

#[test]
fn gate_passes_compatible_versions() {
    let root = unique_root("gate-ok");
    fs::create_dir_all(&root).expect("create root dir");
    let path = root.join("state.cvs");
    gated_snapshot(&path);

    let mut snap = Snapshot::open(&path, "TESTMACH").expect("open snapshot");

    // Точный major и minor не ниже требуемого
    let m = snap.open_module_expect("VIC", 2, 5).expect("exact version");
    m.close().expect("close");
    let m = snap.open_module_expect("VIC", 2, 3).expect("older minor requirement");
    assert_eq!(m.major(), 2);
    assert_eq!(m.minor(), 5);
    m.close().expect("close");

    snap.close().expect("close snapshot");
}

#[test]
fn gate_classifies_failures() {
    let root = unique_root("gate-fail");
    fs::create_dir_all(&root).expect("create root dir");
    let path = root.join("state.cvs");
    gated_snapshot(&path);

    let mut snap = Snapshot::open(&path, "TESTMACH").expect("open snapshot");

    // Снапшот новее требования: HigherVersion
    let err = snap.open_module_expect("VIC", 1, 0).expect_err("2.5 > 1.0");
    assert_eq!(*err.kind(), SnapshotErrorKind::HigherVersion);

    // Снапшот старее требования (тот же major): Incompatible
    let err = snap.open_module_expect("VIC", 2, 6).expect_err("2.5 < 2.6");
    assert_eq!(*err.kind(), SnapshotErrorKind::Incompatible);

    // Другой major в любую сторону несовместим
    let err = snap.open_module_expect("VIC", 3, 0).expect_err("major differs");
    assert_eq!(*err.kind(), SnapshotErrorKind::Incompatible);

    // Провал гейта не ломает дальнейшую работу со снапшотом
    let mut sid = snap.open_module("SID").expect("open SID after failures");
    assert_eq!(sid.read_u8().expect("read SID"), 2);
    sid.close().expect("close SID");
    snap.close().expect("close snapshot");
}

#[test]
fn gate_errors_name_the_producer() {
    let root = unique_root("gate-prod");
    fs::create_dir_all(&root).expect("create root dir");
    let path = root.join("state.cvs");
    gated_snapshot(&path);

    let mut snap = Snapshot::open(&path, "TESTMACH").expect("open snapshot");
    let err = snap.open_module_expect("VIC", 2, 6).expect_err("gate fails");

    let p = err.producer().expect("producer attached to gate error");
    assert_eq!(p.version, ENGINE_VERSION);
    assert_eq!(p.revision, ENGINE_REVISION);
    let msg = err.to_string();
    assert!(msg.contains("created by CryoVault"), "msg={msg}");
    snap.close().expect("close snapshot");
}

#[test]
fn gate_on_legacy_snapshot_reports_unknown_producer() {
    // Legacy-контейнер без sub-header'а и модуль версии 9.9
    let mut bytes = Vec::new();
    bytes.extend_from_slice(SNAPSHOT_MAGIC);
    bytes.push(1);
    bytes.push(0);
    bytes.extend_from_slice(&[0u8; SNAPSHOT_MACHINE_LEN]);
    let mut name = [0u8; MODULE_NAME_LEN];
    name[..3].copy_from_slice(b"VIC");
    bytes.extend_from_slice(&name);
    bytes.push(9);
    bytes.push(9);
    let mut sz = [0u8; 4];
    LittleEndian::write_u32(&mut sz, 1);
    bytes.extend_from_slice(&sz);
    bytes.push(0);

    let mut snap = Snapshot::open_from_bytes_unchecked(&bytes).expect("open legacy");
    let err = snap.open_module_expect("VIC", 1, 0).expect_err("9.9 vs 1.0");
    assert_eq!(*err.kind(), SnapshotErrorKind::HigherVersion);
    assert!(err.producer().is_none());
    let msg = err.to_string();
    assert!(msg.contains("unknown engine version"), "msg={msg}");
    snap.close().expect("close snapshot");
}
