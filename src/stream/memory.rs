//! Memory-бэкенд: снапшот в заранее выделенном буфере, без файловой системы.
//!
//! Три режима:
//! - writer(buf)  — запись в чужой буфер фиксированной ёмкости;
//! - reader(buf)  — чтение из готового среза;
//! - probe()      — «пустая» запись, считает только размер (sizing pass).

use std::io::{self, SeekFrom};

use crate::consts::MEM_STREAM_NAME;
use crate::stream::SnapshotStream;

enum Backing<'b> {
    /// Bounded caller-owned buffer, write mode.
    Fixed(&'b mut [u8]),
    /// Read-only view over finished snapshot bytes.
    Frozen(&'b [u8]),
    /// No storage, size accounting only.
    Probe,
}

/// In-memory snapshot stream.
///
/// Логический размер (`len`) растёт только при записи; курсор и размер
/// не меняются, если операция отвергнута (нет места / нет данных).
pub struct MemoryStream<'b> {
    backing: Backing<'b>,
    pos: usize,
    len: usize,
}

impl<'b> MemoryStream<'b> {
    /// Write mode over a caller-owned buffer. Capacity is `buf.len()`.
    pub fn writer(buf: &'b mut [u8]) -> Self {
        MemoryStream {
            backing: Backing::Fixed(buf),
            pos: 0,
            len: 0,
        }
    }

    /// Read mode over finished snapshot bytes.
    pub fn reader(buf: &'b [u8]) -> Self {
        let len = buf.len();
        MemoryStream {
            backing: Backing::Frozen(buf),
            pos: 0,
            len,
        }
    }

    /// Capacity-less write mode: accepts the full write protocol, stores
    /// nothing, tracks the high-water size.
    pub fn probe() -> MemoryStream<'static> {
        MemoryStream {
            backing: Backing::Probe,
            pos: 0,
            len: 0,
        }
    }

    /// Logical size (high-water mark for write modes).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn capacity(&self) -> Option<usize> {
        match &self.backing {
            Backing::Fixed(b) => Some(b.len()),
            Backing::Frozen(b) => Some(b.len()),
            Backing::Probe => None,
        }
    }
}

impl SnapshotStream for MemoryStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let end = match self.pos.checked_add(buf.len()) {
            Some(end) if end <= self.len => end,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "memory stream exhausted",
                ))
            }
        };
        match &self.backing {
            Backing::Fixed(b) => buf.copy_from_slice(&b[self.pos..end]),
            Backing::Frozen(b) => buf.copy_from_slice(&b[self.pos..end]),
            Backing::Probe => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "probe stream is write-only",
                ))
            }
        }
        self.pos = end;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        let end = match self.pos.checked_add(buf.len()) {
            Some(end) => end,
            None => {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "write overflows"))
            }
        };
        match &mut self.backing {
            Backing::Fixed(b) => {
                if end > b.len() {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "memory stream capacity exceeded",
                    ));
                }
                b[self.pos..end].copy_from_slice(buf);
            }
            Backing::Frozen(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "memory stream is read-only",
                ))
            }
            Backing::Probe => {}
        }
        self.pos = end;
        if end > self.len {
            self.len = end;
        }
        Ok(())
    }

    fn tell(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target: Option<u64> = match pos {
            SeekFrom::Start(o) => Some(o),
            SeekFrom::Current(d) => (self.pos as u64).checked_add_signed(d),
            SeekFrom::End(d) => (self.len as u64).checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start or overflow")
        })?;
        // Fixed/Frozen не дают уйти за буфер; probe безграничен.
        if let Some(cap) = self.capacity() {
            if target > cap as u64 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "seek past end of memory stream",
                ));
            }
        }
        self.pos = target as usize;
        Ok(target)
    }

    fn close(&mut self) -> io::Result<()> {
        // Буфер принадлежит вызывающему, освобождать нечего.
        Ok(())
    }

    fn display_name(&self) -> &str {
        MEM_STREAM_NAME
    }
}
