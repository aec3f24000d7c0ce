//! Потоковая абстракция под снапшоты.
//!
//! Что здесь:
//! - SnapshotStream — единый контракт {read, write, tell, seek, close, close_and_delete};
//! - FileStream — файловый бэкенд, прозрачно читает gzip-обёрнутые снапшоты;
//! - MemoryStream — буферный бэкенд (bounded write / frozen read / probe sizing).
//!
//! Контейнер работает только через `dyn SnapshotStream`, бэкенд выбирается
//! в момент открытия и дальше не меняется.

mod file;
mod memory;

pub use file::FileStream;
pub use memory::MemoryStream;

use std::io::{self, SeekFrom};

/// Byte transport under a snapshot container.
///
/// Transfers are all-or-nothing: `read` fills the whole buffer or fails,
/// `write` accepts the whole buffer or fails. Partial progress is never
/// reported to the caller.
pub trait SnapshotStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<()>;
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;
    /// Current absolute position.
    fn tell(&mut self) -> io::Result<u64>;
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    /// Release the backing resource. Write-mode file streams sync to disk.
    fn close(&mut self) -> io::Result<()>;
    /// Close and remove the backing file. Memory streams just close.
    fn close_and_delete(&mut self) -> io::Result<()> {
        self.close()
    }
    /// Name for diagnostics: the path for files, a fixed tag for memory.
    fn display_name(&self) -> &str;
}
