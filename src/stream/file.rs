//! Файловый бэкенд снапшотов.
//!
//! Чтение прозрачно разворачивает gzip: если файл начинается с сигнатуры
//! RFC 1952, весь member распаковывается в память и дальше поток работает
//! поверх неё (seek остаётся доступен). Запись всегда raw.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::debug;

use crate::consts::GZIP_MAGIC;
use crate::stream::SnapshotStream;

// CV_GZIP_SNIFF: 0|false|no|off выключает распознавание gzip при чтении.
#[inline]
fn gzip_sniff_enabled() -> bool {
    match std::env::var("CV_GZIP_SNIFF") {
        Ok(s) => {
            let s = s.trim().to_ascii_lowercase();
            !(s == "0" || s == "false" || s == "no" || s == "off")
        }
        Err(_) => true,
    }
}

enum Backing {
    Os(File),
    /// Inflated gzip member, read-only.
    Mem(Cursor<Vec<u8>>),
    Closed,
}

/// OS-file snapshot stream.
pub struct FileStream {
    backing: Backing,
    path: PathBuf,
    display: String,
    write_mode: bool,
}

impl FileStream {
    /// Write mode: create/truncate the file at `path`.
    pub fn create(path: &Path) -> io::Result<FileStream> {
        let f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(FileStream {
            backing: Backing::Os(f),
            path: path.to_path_buf(),
            display: path.display().to_string(),
            write_mode: true,
        })
    }

    /// Read mode. A gzip-wrapped file is inflated up front and served from
    /// memory; the display name stays the on-disk path.
    pub fn open(path: &Path) -> io::Result<FileStream> {
        let mut f = File::open(path)?;
        let display = path.display().to_string();

        let backing = if gzip_sniff_enabled() && starts_with_gzip(&mut f)? {
            debug!("gzip snapshot detected: {}", display);
            f.seek(SeekFrom::Start(0))?;
            let mut inflated = Vec::new();
            GzDecoder::new(f).read_to_end(&mut inflated)?;
            crate::metrics::record_gzip_inflate();
            Backing::Mem(Cursor::new(inflated))
        } else {
            f.seek(SeekFrom::Start(0))?;
            Backing::Os(f)
        };

        Ok(FileStream {
            backing,
            path: path.to_path_buf(),
            display,
            write_mode: false,
        })
    }
}

fn starts_with_gzip(f: &mut File) -> io::Result<bool> {
    let mut magic = [0u8; 2];
    match f.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        // Короче двух байт — точно не gzip.
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "snapshot stream is closed")
}

impl SnapshotStream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
        match &mut self.backing {
            Backing::Os(f) => f.read_exact(buf),
            Backing::Mem(c) => c.read_exact(buf),
            Backing::Closed => Err(closed()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        match &mut self.backing {
            Backing::Os(f) => f.write_all(buf),
            Backing::Mem(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "gzip snapshot stream is read-only",
            )),
            Backing::Closed => Err(closed()),
        }
    }

    fn tell(&mut self) -> io::Result<u64> {
        match &mut self.backing {
            Backing::Os(f) => f.stream_position(),
            Backing::Mem(c) => Ok(c.position()),
            Backing::Closed => Err(closed()),
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.backing {
            Backing::Os(f) => f.seek(pos),
            Backing::Mem(c) => c.seek(pos),
            Backing::Closed => Err(closed()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match std::mem::replace(&mut self.backing, Backing::Closed) {
            Backing::Os(f) => {
                if self.write_mode {
                    f.sync_all()?;
                }
                Ok(())
            }
            Backing::Mem(_) | Backing::Closed => Ok(()),
        }
    }

    fn close_and_delete(&mut self) -> io::Result<()> {
        // Закрыть обязательно до unlink (Windows держит открытые файлы).
        let close_res = self.close();
        let remove_res = fs::remove_file(&self.path);
        close_res?;
        remove_res
    }

    fn display_name(&self) -> &str {
        &self.display
    }
}
