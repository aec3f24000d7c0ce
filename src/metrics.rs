//! Lightweight global metrics for CryoVault.
//!
//! Потокобезопасные атомарные счётчики (best-effort наблюдаемость,
//! на управляющую логику не влияют):
//! - контейнеры (created / opened / legacy opens / gzip inflates)
//! - модули (created / opened)
//! - payload-байты (written / read)

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Containers -----
static SNAPSHOTS_CREATED: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_OPENED: AtomicU64 = AtomicU64::new(0);
// Открытия файлов без version sub-header (до его введения).
static LEGACY_OPENS: AtomicU64 = AtomicU64::new(0);
static GZIP_INFLATES: AtomicU64 = AtomicU64::new(0);

// ----- Modules -----
static MODULES_CREATED: AtomicU64 = AtomicU64::new(0);
static MODULES_OPENED: AtomicU64 = AtomicU64::new(0);

// ----- Payload traffic -----
static PAYLOAD_BYTES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static PAYLOAD_BYTES_READ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub snapshots_created: u64,
    pub snapshots_opened: u64,
    pub legacy_opens: u64,
    pub gzip_inflates: u64,

    pub modules_created: u64,
    pub modules_opened: u64,

    pub payload_bytes_written: u64,
    pub payload_bytes_read: u64,
}

impl MetricsSnapshot {
    pub fn avg_module_payload_written(&self) -> f64 {
        if self.modules_created == 0 {
            0.0
        } else {
            self.payload_bytes_written as f64 / self.modules_created as f64
        }
    }
}

// ----- Recorders -----
pub fn record_snapshot_created() {
    SNAPSHOTS_CREATED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_snapshot_opened() {
    SNAPSHOTS_OPENED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_legacy_open() {
    LEGACY_OPENS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_gzip_inflate() {
    GZIP_INFLATES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_module_created() {
    MODULES_CREATED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_module_opened() {
    MODULES_OPENED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_payload_written(bytes: u64) {
    PAYLOAD_BYTES_WRITTEN.fetch_add(bytes, Ordering::Relaxed);
}

pub fn record_payload_read(bytes: u64) {
    PAYLOAD_BYTES_READ.fetch_add(bytes, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        snapshots_created: SNAPSHOTS_CREATED.load(Ordering::Relaxed),
        snapshots_opened: SNAPSHOTS_OPENED.load(Ordering::Relaxed),
        legacy_opens: LEGACY_OPENS.load(Ordering::Relaxed),
        gzip_inflates: GZIP_INFLATES.load(Ordering::Relaxed),

        modules_created: MODULES_CREATED.load(Ordering::Relaxed),
        modules_opened: MODULES_OPENED.load(Ordering::Relaxed),

        payload_bytes_written: PAYLOAD_BYTES_WRITTEN.load(Ordering::Relaxed),
        payload_bytes_read: PAYLOAD_BYTES_READ.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    SNAPSHOTS_CREATED.store(0, Ordering::Relaxed);
    SNAPSHOTS_OPENED.store(0, Ordering::Relaxed);
    LEGACY_OPENS.store(0, Ordering::Relaxed);
    GZIP_INFLATES.store(0, Ordering::Relaxed);

    MODULES_CREATED.store(0, Ordering::Relaxed);
    MODULES_OPENED.store(0, Ordering::Relaxed);

    PAYLOAD_BYTES_WRITTEN.store(0, Ordering::Relaxed);
    PAYLOAD_BYTES_READ.store(0, Ordering::Relaxed);
}
