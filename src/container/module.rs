//! Модуль — именованный версионированный chunk внутри снапшота.
//!
//! Протокол записи: заголовок пишется сразу с нулевым полем size,
//! typed-записи накапливают счётчик, close() возвращается к полю size,
//! вписывает реальное число payload-байт и ставит курсор ровно на начало
//! следующего модуля (backpatching).
//!
//! Протокол чтения: линейный скан по цепочке заголовков от первого модуля;
//! каждая typed-операция чтения сперва проверяет, что запрошенные байты
//! не выходят за заявленный конец payload. Обрезанный файл или раздутое
//! поле size ловятся до обращения к потоку.

use std::fmt;
use std::io::{self, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::codec;
use crate::consts::{
    MODULE_HDR_SIZE, MODULE_NAME_LEN, MODULE_OFF_MAJOR, MODULE_OFF_MINOR, MODULE_OFF_SIZE,
};
use crate::error::{Result, SnapshotError, SnapshotErrorKind};
use crate::metrics;

use super::{padded_name_matches, padded_to_string, version_at_least, Snapshot};

/// Открытая сессия одного модуля. Мутабельно заимствует снапшот на всё
/// время жизни, так что параллельных модулей не бывает.
///
/// `close()` финализирует модуль штатно; дроп без close() делает то же
/// best-effort и ругается в лог при неудаче.
pub struct Module<'m, 'b> {
    snap: &'m mut Snapshot<'b>,
    name: String,
    major: u8,
    minor: u8,
    write_mode: bool,
    /// Абсолютный оффсет заголовка модуля.
    start: u64,
    /// Payload-байты: бегущий счётчик (запись) или заявленный размер (чтение).
    size: u32,
    /// Оффсет поля size — сюда вернёмся патчить.
    size_offset: u64,
    closed: bool,
}

// Derive не подходит: внутри мутабельная ссылка на Snapshot с потоком.
impl fmt::Debug for Module<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("version", &format_args!("{}.{}", self.major, self.minor))
            .field("write_mode", &self.write_mode)
            .field("start", &self.start)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

struct Found {
    start: u64,
    major: u8,
    minor: u8,
    size: u32,
}

impl<'m, 'b> Module<'m, 'b> {
    pub(crate) fn create(
        snap: &'m mut Snapshot<'b>,
        name: &str,
        major: u8,
        minor: u8,
    ) -> Result<Module<'m, 'b>> {
        if !snap.write_mode {
            return Err(SnapshotError::new(SnapshotErrorKind::SnapshotReadOnly)
                .with_module(name)
                .with_file(&snap.display));
        }
        let res = (|| -> Result<(u64, u64)> {
            let start = snap.stream.tell().map_err(|e| {
                SnapshotError::new(SnapshotErrorKind::IllegalOffset).with_source(e)
            })?;
            codec::write_padded_string(snap.stream.as_mut(), name, MODULE_NAME_LEN, 0)?;
            codec::write_u8(snap.stream.as_mut(), major)?;
            codec::write_u8(snap.stream.as_mut(), minor)?;
            let size_offset = snap.stream.tell().map_err(|e| {
                SnapshotError::new(SnapshotErrorKind::IllegalOffset).with_source(e)
            })?;
            // Placeholder; реальный размер впишет close().
            codec::write_u32(snap.stream.as_mut(), 0)?;
            Ok((start, size_offset))
        })();
        match res {
            Ok((start, size_offset)) => {
                metrics::record_module_created();
                Ok(Module {
                    snap,
                    name: name.to_string(),
                    major,
                    minor,
                    write_mode: true,
                    start,
                    size: 0,
                    size_offset,
                    closed: false,
                })
            }
            Err(e) => Err(e.with_module(name).with_file(&snap.display)),
        }
    }

    pub(crate) fn open(snap: &'m mut Snapshot<'b>, name: &str) -> Result<Module<'m, 'b>> {
        if snap.write_mode {
            return Err(SnapshotError::new(SnapshotErrorKind::SnapshotWriteOnly)
                .with_module(name)
                .with_file(&snap.display));
        }
        let first = snap.first_module_offset;
        match scan_for(snap, name) {
            Ok(found) => {
                metrics::record_module_opened();
                let size_offset = found.start + MODULE_OFF_SIZE as u64;
                Ok(Module {
                    snap,
                    name: name.to_string(),
                    major: found.major,
                    minor: found.minor,
                    write_mode: false,
                    start: found.start,
                    size: found.size,
                    size_offset,
                    closed: false,
                })
            }
            Err(e) => {
                // Неудачный скан не должен двигать курсор.
                let _ = snap.stream.seek(SeekFrom::Start(first));
                Err(e.with_module(name).with_file(&snap.display))
            }
        }
    }

    pub(crate) fn open_expect(
        snap: &'m mut Snapshot<'b>,
        name: &str,
        req_major: u8,
        req_minor: u8,
    ) -> Result<Module<'m, 'b>> {
        let m = Module::open(snap, name)?;
        if version_at_least(m.major, m.minor, req_major, req_minor) {
            return Ok(m);
        }
        let kind = if (m.major, m.minor) > (req_major, req_minor) {
            SnapshotErrorKind::HigherVersion
        } else {
            SnapshotErrorKind::Incompatible
        };
        let err = SnapshotError::new(kind)
            .with_module(&m.name)
            .with_file(&m.snap.display)
            .with_producer(m.snap.producer);
        // m дропается здесь и сам переставляет курсор за модуль.
        Err(err)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn major(&self) -> u8 {
        self.major
    }

    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Payload-байты: записанные к этому моменту (запись) либо заявленные
    /// в заголовке (чтение).
    pub fn size(&self) -> u32 {
        self.size
    }

    // -------- Запись --------

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        codec::write_u8(self.snap.stream.as_mut(), v).map_err(|e| self.ctx(e))?;
        self.grow(1)
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        codec::write_u16(self.snap.stream.as_mut(), v).map_err(|e| self.ctx(e))?;
        self.grow(2)
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        codec::write_u32(self.snap.stream.as_mut(), v).map_err(|e| self.ctx(e))?;
        self.grow(4)
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        codec::write_f64(self.snap.stream.as_mut(), v).map_err(|e| self.ctx(e))?;
        self.grow(8)
    }

    pub fn write_u8_array(&mut self, vals: &[u8]) -> Result<()> {
        codec::write_u8_array(self.snap.stream.as_mut(), vals).map_err(|e| self.ctx(e))?;
        self.grow(vals.len() as u64)
    }

    pub fn write_u16_array(&mut self, vals: &[u16]) -> Result<()> {
        codec::write_u16_array(self.snap.stream.as_mut(), vals).map_err(|e| self.ctx(e))?;
        self.grow(vals.len() as u64 * 2)
    }

    pub fn write_u32_array(&mut self, vals: &[u32]) -> Result<()> {
        codec::write_u32_array(self.snap.stream.as_mut(), vals).map_err(|e| self.ctx(e))?;
        self.grow(vals.len() as u64 * 4)
    }

    /// Строка в поле фиксированной ширины `len` с добивкой `pad`.
    pub fn write_padded_string(&mut self, v: &str, len: usize, pad: u8) -> Result<()> {
        codec::write_padded_string(self.snap.stream.as_mut(), v, len, pad)
            .map_err(|e| self.ctx(e))?;
        self.grow(len as u64)
    }

    /// Length-prefixed строка; None — нулевой префикс без тела.
    pub fn write_string(&mut self, v: Option<&str>) -> Result<()> {
        let n = codec::write_string(self.snap.stream.as_mut(), v).map_err(|e| self.ctx(e))?;
        self.grow(n)
    }

    // -------- Чтение (каждая операция сперва проверяет границы) --------

    pub fn read_u8(&mut self) -> Result<u8> {
        self.check_read(1)?;
        let v = codec::read_u8(self.snap.stream.as_mut()).map_err(|e| self.ctx(e))?;
        metrics::record_payload_read(1);
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.check_read(2)?;
        let v = codec::read_u16(self.snap.stream.as_mut()).map_err(|e| self.ctx(e))?;
        metrics::record_payload_read(2);
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.check_read(4)?;
        let v = codec::read_u32(self.snap.stream.as_mut()).map_err(|e| self.ctx(e))?;
        metrics::record_payload_read(4);
        Ok(v)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.check_read(8)?;
        let v = codec::read_f64(self.snap.stream.as_mut()).map_err(|e| self.ctx(e))?;
        metrics::record_payload_read(8);
        Ok(v)
    }

    pub fn read_u8_array(&mut self, out: &mut [u8]) -> Result<()> {
        self.check_read(out.len() as u64)?;
        codec::read_u8_array(self.snap.stream.as_mut(), out).map_err(|e| self.ctx(e))?;
        metrics::record_payload_read(out.len() as u64);
        Ok(())
    }

    pub fn read_u16_array(&mut self, out: &mut [u16]) -> Result<()> {
        self.check_read(out.len() as u64 * 2)?;
        codec::read_u16_array(self.snap.stream.as_mut(), out).map_err(|e| self.ctx(e))?;
        metrics::record_payload_read(out.len() as u64 * 2);
        Ok(())
    }

    pub fn read_u32_array(&mut self, out: &mut [u32]) -> Result<()> {
        self.check_read(out.len() as u64 * 4)?;
        codec::read_u32_array(self.snap.stream.as_mut(), out).map_err(|e| self.ctx(e))?;
        metrics::record_payload_read(out.len() as u64 * 4);
        Ok(())
    }

    /// Length-prefixed строка. Длина из префикса проверяется на границы
    /// до чтения тела: раздутый префикс в порченом файле не пройдёт.
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let len = self.read_u16()? as usize;
        if len == 0 {
            return Ok(None);
        }
        self.check_read(len as u64)?;
        let s = codec::read_string_body(self.snap.stream.as_mut(), len)
            .map_err(|e| self.ctx(e))?;
        metrics::record_payload_read(len as u64);
        Ok(Some(s))
    }

    /// Финализировать модуль. Запись: вписать реальный размер в заголовок
    /// и встать за модуль. Чтение: встать за заявленный регион, даже если
    /// payload дочитан не до конца.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let end = self
            .start
            .checked_add(MODULE_HDR_SIZE as u64)
            .and_then(|o| o.checked_add(self.size as u64))
            .ok_or_else(|| {
                self.ctx(SnapshotError::new(SnapshotErrorKind::IllegalOffset))
            })?;

        if self.write_mode {
            self.snap
                .stream
                .seek(SeekFrom::Start(self.size_offset))
                .map_err(|e| {
                    self.ctx(SnapshotError::new(SnapshotErrorKind::ModuleClose).with_source(e))
                })?;
            codec::write_u32(self.snap.stream.as_mut(), self.size)
                .map_err(|e| self.ctx(e.rekind(SnapshotErrorKind::ModuleClose)))?;
            self.snap.stream.seek(SeekFrom::Start(end)).map_err(|e| {
                self.ctx(SnapshotError::new(SnapshotErrorKind::ModuleClose).with_source(e))
            })?;
            debug!("module {} closed, {} payload bytes", self.name, self.size);
        } else {
            self.snap.stream.seek(SeekFrom::Start(end)).map_err(|e| {
                self.ctx(SnapshotError::new(SnapshotErrorKind::ModuleSkip).with_source(e))
            })?;
        }
        Ok(())
    }

    fn grow(&mut self, n: u64) -> Result<()> {
        let new_size = u32::try_from(n)
            .ok()
            .and_then(|n| self.size.checked_add(n));
        match new_size {
            Some(s) => {
                self.size = s;
                metrics::record_payload_written(n);
                Ok(())
            }
            // Payload перерос u32-поле размера.
            None => Err(self.ctx(SnapshotError::new(SnapshotErrorKind::IllegalOffset))),
        }
    }

    fn check_read(&mut self, n: u64) -> Result<()> {
        let pos = self.snap.stream.tell().map_err(|e| {
            SnapshotError::new(SnapshotErrorKind::IllegalOffset).with_source(e)
        });
        let pos = match pos {
            Ok(p) => p,
            Err(e) => return Err(self.ctx(e)),
        };
        let end = self
            .start
            .checked_add(MODULE_HDR_SIZE as u64)
            .and_then(|o| o.checked_add(self.size as u64));
        let fits = match (end, pos.checked_add(n)) {
            (Some(end), Some(want)) => want <= end,
            _ => false,
        };
        if !fits {
            return Err(self.ctx(SnapshotError::new(SnapshotErrorKind::ReadOutOfBounds)));
        }
        Ok(())
    }

    fn ctx(&self, e: SnapshotError) -> SnapshotError {
        e.with_module(&self.name).with_file(&self.snap.display)
    }
}

impl Drop for Module<'_, '_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.finish() {
                warn!("module {} dropped unclosed, finalization failed: {}", self.name, e);
            }
        }
    }
}

fn scan_for(snap: &mut Snapshot<'_>, name: &str) -> Result<Found> {
    use SnapshotErrorKind::*;

    let mut off = snap.first_module_offset;
    snap.stream
        .seek(SeekFrom::Start(off))
        .map_err(|e| SnapshotError::new(FirstModuleMissing).with_source(e))?;
    loop {
        let mut hdr = [0u8; MODULE_HDR_SIZE];
        match snap.stream.read(&mut hdr) {
            Ok(()) => {}
            // Цепочка кончилась, имени в ней не было.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(SnapshotError::new(ModuleNotFound).with_source(e));
            }
            Err(e) => return Err(SnapshotError::new(ModuleHeaderRead).with_source(e)),
        }
        let size = LittleEndian::read_u32(&hdr[MODULE_OFF_SIZE..MODULE_OFF_SIZE + 4]);
        if padded_name_matches(&hdr[..MODULE_NAME_LEN], name) {
            return Ok(Found {
                start: off,
                major: hdr[MODULE_OFF_MAJOR],
                minor: hdr[MODULE_OFF_MINOR],
                size,
            });
        }
        debug!(
            "module scan: skipping {} ({} B) at {}",
            padded_to_string(&hdr[..MODULE_NAME_LEN]),
            size,
            off
        );
        off = off
            .checked_add(MODULE_HDR_SIZE as u64)
            .and_then(|o| o.checked_add(size as u64))
            .ok_or_else(|| SnapshotError::new(IllegalOffset))?;
        match snap.stream.seek(SeekFrom::Start(off)) {
            Ok(_) => {}
            // Memory-поток не пускает за конец буфера: дальше модулей нет.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                return Err(SnapshotError::new(ModuleNotFound).with_source(e));
            }
            Err(e) => return Err(SnapshotError::new(ModuleSkip).with_source(e)),
        }
    }
}
