use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use CryoVault::consts::{ENGINE_VERSION, MODULE_HDR_SIZE, SNAPSHOT_HDR_SIZE, VERSION_HDR_SIZE};
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

// Один модуль "CPU" v1.2 с u32-регистром и необязательной строкой.
// Payload: 4 (u32) + 2 (префикс) + 3 ("hi\0") = 9 байт.
const CPU_PAYLOAD: u64 = 9;

#[test]
fn file_roundtrip() {
    let root = unique_root("roundtrip");
    fs::create_dir_all(&root).expect("create root dir");
    let path = root.join("state.cvs");

    {
        let mut snap = Snapshot::create(&path, 1, 0, "TESTMACH").expect("create snapshot");
        let mut m = snap.create_module("CPU", 1, 2).expect("create CPU module");
        m.write_u32(0xDEAD_BEEF).expect("write register");
        m.write_string(Some("hi")).expect("write tag");
        m.close().expect("close CPU module");
        snap.close().expect("close snapshot");
    }

    // Файл без лишних байтов: оба заголовка + заголовок модуля + payload
    let expected =
        (SNAPSHOT_HDR_SIZE + VERSION_HDR_SIZE + MODULE_HDR_SIZE) as u64 + CPU_PAYLOAD;
    let on_disk = fs::metadata(&path).expect("snapshot metadata").len();
    assert_eq!(on_disk, expected, "snapshot must have no trailing bytes");

    {
        let mut snap = Snapshot::open(&path, "TESTMACH").expect("open snapshot");
        assert_eq!(snap.major(), 1);
        assert_eq!(snap.minor(), 0);
        assert_eq!(snap.machine(), "TESTMACH");
        let producer = snap.producer().expect("producer recorded");
        assert_eq!(producer.version, ENGINE_VERSION);

        let mut m = snap
            .open_module_expect("CPU", 1, 0)
            .expect("open CPU module with version gate");
        assert_eq!(m.major(), 1);
        assert_eq!(m.minor(), 2);
        assert_eq!(m.size() as u64, CPU_PAYLOAD);
        assert_eq!(m.read_u32().expect("read register"), 0xDEAD_BEEF);
        assert_eq!(m.read_string().expect("read tag").as_deref(), Some("hi"));
        m.close().expect("close CPU module");
        snap.close().expect("close snapshot");
    }
}

#[test]
fn memory_roundtrip() {
    let mut buf = [0u8; 256];
    let total;
    {
        let mut snap =
            Snapshot::create_in_buffer(&mut buf, 1, 0, "TESTMACH").expect("create in buffer");
        let mut m = snap.create_module("CPU", 1, 2).expect("create CPU module");
        m.write_u32(0xDEAD_BEEF).expect("write register");
        m.write_string(Some("hi")).expect("write tag");
        m.close().expect("close CPU module");
        total = snap.position().expect("total size") as usize;
        snap.close().expect("close snapshot");
    }
    assert_eq!(
        total,
        SNAPSHOT_HDR_SIZE + VERSION_HDR_SIZE + MODULE_HDR_SIZE + CPU_PAYLOAD as usize
    );

    let mut snap = Snapshot::open_from_bytes(&buf[..total], "TESTMACH").expect("open from bytes");
    let mut m = snap.open_module("CPU").expect("open CPU module");
    assert_eq!(m.read_u32().expect("read register"), 0xDEAD_BEEF);
    assert_eq!(m.read_string().expect("read tag").as_deref(), Some("hi"));
    m.close().expect("close CPU module");
    snap.close().expect("close snapshot");
}

#[test]
fn machine_gate_rejects_foreign_snapshot() {
    let root = unique_root("machine");
    fs::create_dir_all(&root).expect("create root dir");
    let path = root.join("state.cvs");

    {
        let snap = Snapshot::create(&path, 2, 1, "PET3032").expect("create snapshot");
        snap.close().expect("close snapshot");
    }

    let err = Snapshot::open(&path, "C64").expect_err("machine gate must reject");
    match err.kind() {
        SnapshotErrorKind::MachineMismatch { expected, found } => {
            assert_eq!(expected, "C64");
            assert_eq!(found, "PET3032");
        }
        other => panic!("unexpected kind: {other:?}"),
    }

    // Без гейта тот же файл открывается
    let snap = Snapshot::open_unchecked(&path).expect("unchecked open");
    assert_eq!(snap.machine(), "PET3032");
    snap.close().expect("close snapshot");
}

#[test]
fn garbage_is_not_a_snapshot() {
    let junk = b"definitely not a snapshot container, far too short on magic";
    let err = Snapshot::open_from_bytes(junk, "TESTMACH").expect_err("magic must mismatch");
    assert_eq!(*err.kind(), SnapshotErrorKind::MagicMismatch);
}

#[test]
fn module_mode_follows_snapshot_mode() {
    let root = unique_root("mode");
    fs::create_dir_all(&root).expect("create root dir");
    let path = root.join("state.cvs");

    {
        let mut snap = Snapshot::create(&path, 1, 0, "TESTMACH").expect("create snapshot");
        // Пишущий контейнер не отдаёт модули на чтение
        let err = snap.open_module("CPU").expect_err("write mode has no reads");
        assert_eq!(*err.kind(), SnapshotErrorKind::SnapshotWriteOnly);

        let mut m = snap.create_module("CPU", 1, 0).expect("create CPU");
        m.write_u8(1).expect("write");
        m.close().expect("close CPU");
        snap.close().expect("close snapshot");
    }

    let mut snap = Snapshot::open(&path, "TESTMACH").expect("open snapshot");
    // ...а читающий не принимает новых модулей
    let err = snap
        .create_module("EXTRA", 1, 0)
        .expect_err("read mode has no writes");
    assert_eq!(*err.kind(), SnapshotErrorKind::SnapshotReadOnly);
    assert_eq!(err.module(), Some("EXTRA"));

    // Отказ гейта не сдвинул курсор: обычное чтение работает
    let mut m = snap.open_module("CPU").expect("open CPU");
    assert_eq!(m.read_u8().expect("read"), 1);
    m.close().expect("close CPU");
    snap.close().expect("close snapshot");
}

#[test]
fn handles_render_debug() {
    let mut buf = [0u8; 128];
    let mut snap =
        Snapshot::create_in_buffer(&mut buf, 1, 0, "TESTMACH").expect("create in buffer");
    let dbg = format!("{snap:?}");
    assert!(dbg.contains("TESTMACH"), "dbg={dbg}");

    let m = snap.create_module("CPU", 1, 2).expect("create CPU");
    let dbg = format!("{m:?}");
    assert!(dbg.contains("CPU"), "dbg={dbg}");
    m.close().expect("close CPU");
    snap.close().expect("close snapshot");
}

#[test]
fn list_modules_reports_chain_and_restores_cursor() {
    let root = unique_root("list");
    fs::create_dir_all(&root).expect("create root dir");
    let path = root.join("state.cvs");

    {
        let mut snap = Snapshot::create(&path, 1, 0, "TESTMACH").expect("create snapshot");
        let mut a = snap.create_module("CPU", 1, 2).expect("create CPU");
        a.write_u32(1).expect("write");
        a.close().expect("close CPU");
        let mut b = snap.create_module("RAM", 0, 1).expect("create RAM");
        b.write_u8_array(&[0u8; 64]).expect("write RAM");
        b.close().expect("close RAM");
        snap.close().expect("close snapshot");
    }

    let mut snap = Snapshot::open(&path, "TESTMACH").expect("open snapshot");
    let mods = snap.list_modules().expect("list modules");
    assert_eq!(mods.len(), 2);
    assert_eq!(mods[0].name, "CPU");
    assert_eq!(mods[0].size, 4);
    assert_eq!(mods[0].offset, snap.first_module_offset());
    assert_eq!(mods[1].name, "RAM");
    assert_eq!(mods[1].size, 64);
    assert_eq!(
        mods[1].offset,
        mods[0].offset + MODULE_HDR_SIZE as u64 + mods[0].size as u64
    );

    // Перечисление не должно сдвинуть курсор: модуль открывается как обычно
    let mut m = snap.open_module("CPU").expect("open CPU after list");
    assert_eq!(m.read_u32().expect("read"), 1);
    m.close().expect("close CPU");
    snap.close().expect("close snapshot");
}
