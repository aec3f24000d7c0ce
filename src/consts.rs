//! Общие константы формата снапшотов (primary header, version sub-header, modules).

// -------- Primary header --------
// Layout:
// [magic 19B, null-padded]
// [major u8][minor u8]
// [machine name 16B, null-padded]
// Total = 19 + 1 + 1 + 16 = 37 bytes.
pub const SNAPSHOT_MAGIC: &[u8; 19] = b"CryoVault Snapshot\x1a";
pub const SNAPSHOT_MAGIC_LEN: usize = 19;
pub const SNAPSHOT_MACHINE_LEN: usize = 16;
pub const SNAPSHOT_HDR_SIZE: usize = 37;

// -------- Version sub-header (опциональный, отсутствует в legacy-файлах) --------
// Layout:
// [magic 18B]
// [engine version 4 x u8]
// [build revision u32 LE]
// Total = 18 + 4 + 4 = 26 bytes.
pub const VERSION_MAGIC: &[u8; 18] = b"CryoVault Version\x1a";
pub const VERSION_MAGIC_LEN: usize = 18;
pub const VERSION_HDR_SIZE: usize = 26;

// Версия движка, штампуется в sub-header при создании.
pub const ENGINE_VERSION: [u8; 4] = [0, 1, 0, 0];
// Ревизия сборки (release-сборки проставляют номер, dev = 0).
pub const ENGINE_REVISION: u32 = 0;

// -------- Module header --------
// Layout:
// [name 16B, null-padded]
// [major u8][minor u8]
// [size u32 LE]      -- payload bytes only, header не входит
// Total = 16 + 1 + 1 + 4 = 22 bytes.
pub const MODULE_NAME_LEN: usize = 16;
pub const MODULE_HDR_SIZE: usize = 22;

// Offsets inside module header
pub const MODULE_OFF_NAME: usize = 0;
pub const MODULE_OFF_MAJOR: usize = 16;
pub const MODULE_OFF_MINOR: usize = 17;
pub const MODULE_OFF_SIZE: usize = 18;

// -------- Streams --------
// Сигнатура gzip-обёртки (RFC 1952), для прозрачного чтения сжатых снапшотов.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// Display-имя memory-потоков в диагностике (реального файла нет).
pub const MEM_STREAM_NAME: &str = "<memory>";
