//! Контейнер снапшота целиком.
//!
//! Что здесь:
//! - Snapshot — создание/открытие/закрытие контейнера (файл, буфер, probe);
//! - ProducerInfo — версия движка из version sub-header;
//! - ModuleInfo — строка перечисления модулей (list_modules);
//! - version_at_least — гейт совместимости (major точно, minor не ниже).
//!
//! Формат:
//! [SNAPSHOT_MAGIC 19B][major u8][minor u8][machine 16B null-padded]
//! [VERSION_MAGIC 18B][engine version 4B][revision u32 LE]   -- опционален
//! [модули подряд...]
//!
//! Sub-header отсутствует в legacy-файлах: при несовпадении его magic
//! откатываемся на позицию до попытки и продолжаем чтение с warn'ом.

pub mod module;

use std::fmt;
use std::io::{self, SeekFrom};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::warn;

use crate::codec;
use crate::consts::{
    ENGINE_REVISION, ENGINE_VERSION, MEM_STREAM_NAME, MODULE_HDR_SIZE, MODULE_NAME_LEN,
    MODULE_OFF_MAJOR, MODULE_OFF_MINOR, MODULE_OFF_SIZE, SNAPSHOT_MACHINE_LEN, SNAPSHOT_MAGIC,
    SNAPSHOT_MAGIC_LEN, VERSION_MAGIC, VERSION_MAGIC_LEN,
};
use crate::error::{Result, SnapshotError, SnapshotErrorKind};
use crate::metrics;
use crate::stream::{FileStream, MemoryStream, SnapshotStream};

pub use module::Module;

/// true, если (major, minor) проходит требование: major совпадает точно,
/// minor не ниже требуемого.
pub fn version_at_least(major: u8, minor: u8, req_major: u8, req_minor: u8) -> bool {
    major == req_major && minor >= req_minor
}

/// Версия движка, записавшего снапшот (из version sub-header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerInfo {
    /// [major, minor, patch, reserved]
    pub version: [u8; 4],
    pub revision: u32,
}

impl fmt::Display for ProducerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CryoVault {}.{}.{} (r{})",
            self.version[0], self.version[1], self.version[2], self.revision
        )
    }
}

/// Строка перечисления модулей.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub major: u8,
    pub minor: u8,
    /// Payload-байты, заголовок не входит.
    pub size: u32,
    /// Абсолютный оффсет заголовка модуля.
    pub offset: u64,
}

/// Снапшот-контейнер. Владеет потоком эксклюзивно; открытый модуль
/// мутабельно заимствует контейнер, так что одновременно активен максимум
/// один модуль.
pub struct Snapshot<'b> {
    pub(crate) stream: Box<dyn SnapshotStream + 'b>,
    pub(crate) display: String,
    pub(crate) write_mode: bool,
    major: u8,
    minor: u8,
    machine: String,
    pub(crate) producer: Option<ProducerInfo>,
    pub(crate) first_module_offset: u64,
}

// Derive невозможен из-за Box<dyn SnapshotStream>.
impl fmt::Debug for Snapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("file", &self.display)
            .field("machine", &self.machine)
            .field("version", &format_args!("{}.{}", self.major, self.minor))
            .field("write_mode", &self.write_mode)
            .field("first_module_offset", &self.first_module_offset)
            .finish_non_exhaustive()
    }
}

struct Header {
    major: u8,
    minor: u8,
    machine: String,
    producer: Option<ProducerInfo>,
    first_module_offset: u64,
}

impl Snapshot<'static> {
    /// Создать снапшот-файл: primary header + version sub-header.
    /// Частично записанный файл при любой ошибке закрывается и удаляется.
    pub fn create(path: &Path, major: u8, minor: u8, machine: &str) -> Result<Snapshot<'static>> {
        let display = path.display().to_string();
        let stream = FileStream::create(path).map_err(|e| {
            SnapshotError::new(SnapshotErrorKind::CannotCreate)
                .with_source(e)
                .with_file(&display)
        })?;
        Snapshot::create_on(Box::new(stream), display, major, minor, machine)
    }

    /// Открыть снапшот-файл, требуя совпадения machine-тега.
    pub fn open(path: &Path, machine: &str) -> Result<Snapshot<'static>> {
        Snapshot::open_file(path, Some(machine))
    }

    /// Открыть без machine-гейта (magic проверяется всегда). Для тулинга,
    /// которому нужно показать чужой снапшот.
    pub fn open_unchecked(path: &Path) -> Result<Snapshot<'static>> {
        Snapshot::open_file(path, None)
    }

    fn open_file(path: &Path, expected_machine: Option<&str>) -> Result<Snapshot<'static>> {
        let display = path.display().to_string();
        let stream = FileStream::open(path).map_err(|e| {
            SnapshotError::new(SnapshotErrorKind::CannotOpenForRead)
                .with_source(e)
                .with_file(&display)
        })?;
        Snapshot::open_on(Box::new(stream), display, expected_machine)
    }

    /// Sizing pass: принимает весь протокол записи, не храня байтов.
    /// Итоговый размер — `position()` после закрытия последнего модуля.
    pub fn create_probe(major: u8, minor: u8, machine: &str) -> Result<Snapshot<'static>> {
        Snapshot::create_on(
            Box::new(MemoryStream::probe()),
            MEM_STREAM_NAME.to_string(),
            major,
            minor,
            machine,
        )
    }
}

impl<'b> Snapshot<'b> {
    /// Создать снапшот в пользовательском буфере фиксированной ёмкости.
    pub fn create_in_buffer(
        buf: &'b mut [u8],
        major: u8,
        minor: u8,
        machine: &str,
    ) -> Result<Snapshot<'b>> {
        Snapshot::create_on(
            Box::new(MemoryStream::writer(buf)),
            MEM_STREAM_NAME.to_string(),
            major,
            minor,
            machine,
        )
    }

    /// Открыть снапшот из готового среза, требуя совпадения machine-тега.
    pub fn open_from_bytes(buf: &'b [u8], machine: &str) -> Result<Snapshot<'b>> {
        Snapshot::open_on(
            Box::new(MemoryStream::reader(buf)),
            MEM_STREAM_NAME.to_string(),
            Some(machine),
        )
    }

    /// Открыть срез без machine-гейта.
    pub fn open_from_bytes_unchecked(buf: &'b [u8]) -> Result<Snapshot<'b>> {
        Snapshot::open_on(
            Box::new(MemoryStream::reader(buf)),
            MEM_STREAM_NAME.to_string(),
            None,
        )
    }

    fn create_on(
        mut stream: Box<dyn SnapshotStream + 'b>,
        display: String,
        major: u8,
        minor: u8,
        machine: &str,
    ) -> Result<Snapshot<'b>> {
        match write_header(stream.as_mut(), major, minor, machine) {
            Ok(first_module_offset) => {
                metrics::record_snapshot_created();
                Ok(Snapshot {
                    stream,
                    display,
                    write_mode: true,
                    major,
                    minor,
                    machine: machine.to_string(),
                    producer: Some(ProducerInfo {
                        version: ENGINE_VERSION,
                        revision: ENGINE_REVISION,
                    }),
                    first_module_offset,
                })
            }
            Err(e) => {
                // Недописанный контейнер не оставляем.
                if let Err(del) = stream.close_and_delete() {
                    warn!("cannot remove partial snapshot {}: {}", display, del);
                }
                Err(e.with_file(display))
            }
        }
    }

    fn open_on(
        mut stream: Box<dyn SnapshotStream + 'b>,
        display: String,
        expected_machine: Option<&str>,
    ) -> Result<Snapshot<'b>> {
        match read_header(stream.as_mut(), expected_machine) {
            Ok(hdr) => {
                metrics::record_snapshot_opened();
                if hdr.producer.is_none() {
                    metrics::record_legacy_open();
                }
                Ok(Snapshot {
                    stream,
                    display,
                    write_mode: false,
                    major: hdr.major,
                    minor: hdr.minor,
                    machine: hdr.machine,
                    producer: hdr.producer,
                    first_module_offset: hdr.first_module_offset,
                })
            }
            Err(e) => {
                if let Err(close) = stream.close() {
                    warn!("cannot close snapshot {}: {}", display, close);
                }
                Err(e.with_file(display))
            }
        }
    }

    pub fn major(&self) -> u8 {
        self.major
    }

    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Machine-тег из заголовка (какой машине принадлежит состояние).
    pub fn machine(&self) -> &str {
        &self.machine
    }

    /// Кто записал снапшот; None у legacy-файлов без sub-header'а.
    pub fn producer(&self) -> Option<ProducerInfo> {
        self.producer
    }

    pub fn display_name(&self) -> &str {
        &self.display
    }

    /// Смещение первого модульного заголовка (сразу за заголовками снапшота).
    pub fn first_module_offset(&self) -> u64 {
        self.first_module_offset
    }

    /// Текущая абсолютная позиция потока. После закрытия последнего модуля
    /// равна полному размеру снапшота (этим пользуется probe-режим).
    pub fn position(&mut self) -> Result<u64> {
        let display = &self.display;
        self.stream.tell().map_err(|e| {
            SnapshotError::new(SnapshotErrorKind::IllegalOffset)
                .with_source(e)
                .with_file(display)
        })
    }

    /// Полная длина потока (seek End + возврат курсора).
    pub fn stream_len(&mut self) -> Result<u64> {
        let cur = self.stream.tell();
        let len = cur.and_then(|cur| {
            let len = self.stream.seek(SeekFrom::End(0))?;
            self.stream.seek(SeekFrom::Start(cur))?;
            Ok(len)
        });
        len.map_err(|e| {
            SnapshotError::new(SnapshotErrorKind::IllegalOffset)
                .with_source(e)
                .with_file(&self.display)
        })
    }

    /// Начать модуль (режим записи). Размер будет вписан при закрытии.
    pub fn create_module(&mut self, name: &str, major: u8, minor: u8) -> Result<Module<'_, 'b>> {
        Module::create(self, name, major, minor)
    }

    /// Найти модуль по имени линейным сканом от первого модуля.
    /// При неудаче курсор возвращается на оффсет первого модуля.
    pub fn open_module(&mut self, name: &str) -> Result<Module<'_, 'b>> {
        Module::open(self, name)
    }

    /// Открыть модуль и применить версионный гейт одним шагом.
    pub fn open_module_expect(
        &mut self,
        name: &str,
        req_major: u8,
        req_minor: u8,
    ) -> Result<Module<'_, 'b>> {
        Module::open_expect(self, name, req_major, req_minor)
    }

    /// Перечислить все модули от первого оффсета, вернув курсор на место.
    pub fn list_modules(&mut self) -> Result<Vec<ModuleInfo>> {
        let first = self.first_module_offset;
        if let Err(e) = self.stream.seek(SeekFrom::Start(first)) {
            return Err(SnapshotError::new(SnapshotErrorKind::FirstModuleMissing)
                .with_source(e)
                .with_file(&self.display));
        }
        let mut out = Vec::new();
        let mut off = first;
        loop {
            let mut hdr = [0u8; MODULE_HDR_SIZE];
            match self.stream.read(&mut hdr) {
                Ok(()) => {}
                // Чистый конец цепочки.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    let _ = self.stream.seek(SeekFrom::Start(first));
                    return Err(SnapshotError::new(SnapshotErrorKind::ModuleHeaderRead)
                        .with_source(e)
                        .with_file(&self.display));
                }
            }
            let size = LittleEndian::read_u32(&hdr[MODULE_OFF_SIZE..MODULE_OFF_SIZE + 4]);
            out.push(ModuleInfo {
                name: padded_to_string(&hdr[..MODULE_NAME_LEN]),
                major: hdr[MODULE_OFF_MAJOR],
                minor: hdr[MODULE_OFF_MINOR],
                size,
                offset: off,
            });
            off = match off
                .checked_add(MODULE_HDR_SIZE as u64)
                .and_then(|o| o.checked_add(size as u64))
            {
                Some(o) => o,
                // Заявленный размер увёл оффсет в переполнение; запись уже
                // в списке, дальше цепочки нет.
                None => break,
            };
            if self.stream.seek(SeekFrom::Start(off)).is_err() {
                break;
            }
        }
        let _ = self.stream.seek(SeekFrom::Start(first));
        Ok(out)
    }

    /// Закрыть контейнер и освободить поток.
    pub fn close(mut self) -> Result<()> {
        self.stream.close().map_err(|e| {
            SnapshotError::new(SnapshotErrorKind::CloseFailed)
                .with_source(e)
                .with_file(&self.display)
        })
    }
}

fn write_header(s: &mut dyn SnapshotStream, major: u8, minor: u8, machine: &str) -> Result<u64> {
    use SnapshotErrorKind::*;

    codec::write_u8_array(s, SNAPSHOT_MAGIC).map_err(|e| e.rekind(CannotWriteMagic))?;
    codec::write_u8(s, major).map_err(|e| e.rekind(CannotWriteVersion))?;
    codec::write_u8(s, minor).map_err(|e| e.rekind(CannotWriteVersion))?;
    codec::write_padded_string(s, machine, SNAPSHOT_MACHINE_LEN, 0)
        .map_err(|e| e.rekind(CannotWriteMachineName))?;

    codec::write_u8_array(s, VERSION_MAGIC).map_err(|e| e.rekind(CannotWriteVersion))?;
    codec::write_u8_array(s, &ENGINE_VERSION).map_err(|e| e.rekind(CannotWriteVersion))?;
    codec::write_u32(s, ENGINE_REVISION).map_err(|e| e.rekind(CannotWriteVersion))?;

    s.tell()
        .map_err(|e| SnapshotError::new(IllegalOffset).with_source(e))
}

fn read_header(s: &mut dyn SnapshotStream, expected_machine: Option<&str>) -> Result<Header> {
    use SnapshotErrorKind::*;

    let mut magic = [0u8; SNAPSHOT_MAGIC_LEN];
    codec::read_u8_array(s, &mut magic).map_err(|e| e.rekind(MagicMismatch))?;
    if &magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::new(MagicMismatch));
    }

    let major = codec::read_u8(s).map_err(|e| e.rekind(CannotReadVersion))?;
    let minor = codec::read_u8(s).map_err(|e| e.rekind(CannotReadVersion))?;

    let mut machine_raw = [0u8; SNAPSHOT_MACHINE_LEN];
    codec::read_u8_array(s, &mut machine_raw).map_err(|e| e.rekind(CannotReadMachineName))?;
    let machine = padded_to_string(&machine_raw);

    if let Some(expected) = expected_machine {
        if !padded_name_matches(&machine_raw, expected) {
            return Err(SnapshotError::new(MachineMismatch {
                expected: expected.to_string(),
                found: machine,
            }));
        }
    }

    let before = s
        .tell()
        .map_err(|e| SnapshotError::new(IllegalOffset).with_source(e))?;
    let producer = match try_read_version_header(s)? {
        Some(p) => Some(p),
        None => {
            // Legacy-файл без sub-header'а: откат и читаем дальше.
            s.seek(SeekFrom::Start(before))
                .map_err(|e| SnapshotError::new(IllegalOffset).with_source(e))?;
            warn!("snapshot pre-dates version records, producer unknown");
            None
        }
    };

    let first_module_offset = s
        .tell()
        .map_err(|e| SnapshotError::new(IllegalOffset).with_source(e))?;

    Ok(Header {
        major,
        minor,
        machine,
        producer,
        first_module_offset,
    })
}

fn try_read_version_header(s: &mut dyn SnapshotStream) -> Result<Option<ProducerInfo>> {
    use SnapshotErrorKind::*;

    let mut magic = [0u8; VERSION_MAGIC_LEN];
    match s.read(&mut magic) {
        Ok(()) => {}
        // Файл короче sub-header'а — значит, его там нет.
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(SnapshotError::new(CannotReadVersion).with_source(e)),
    }
    if &magic != VERSION_MAGIC {
        return Ok(None);
    }

    // Magic совпал: дальше обрыв — уже порча, а не legacy.
    let mut version = [0u8; 4];
    codec::read_u8_array(s, &mut version).map_err(|e| e.rekind(CannotReadVersion))?;
    let revision = codec::read_u32(s).map_err(|e| e.rekind(CannotReadVersion))?;
    Ok(Some(ProducerInfo { version, revision }))
}

/// Снять строку с null-padded поля фиксированной ширины.
pub(crate) fn padded_to_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Сравнение имени с null-padded полем: совпадение — вся ширина целиком
/// либо префикс до терминатора в сохранённом поле.
pub(crate) fn padded_name_matches(stored: &[u8], name: &str) -> bool {
    let name = name.as_bytes();
    let len = name.len();
    if len > stored.len() {
        return false;
    }
    &stored[..len] == name && (len == stored.len() || stored[len] == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_gate() {
        assert!(!version_at_least(2, 5, 2, 6));
        assert!(version_at_least(2, 6, 2, 5));
        assert!(version_at_least(2, 5, 2, 5));
        // major должен совпадать точно, даже если "новее"
        assert!(!version_at_least(3, 0, 2, 9));
    }

    #[test]
    fn padded_name_rules() {
        let stored = b"CPU\0\0\0\0\0\0\0\0\0\0\0\0\0";
        assert!(padded_name_matches(stored, "CPU"));
        assert!(!padded_name_matches(stored, "CP"));
        assert!(!padded_name_matches(stored, "CPU2"));

        // Имя во всю ширину поля, без терминатора.
        let full = b"0123456789ABCDEF";
        assert!(padded_name_matches(full, "0123456789ABCDEF"));
        assert!(!padded_name_matches(full, "0123456789ABCDEF0"));
        assert!(!padded_name_matches(full, "0123456789ABCDE"));
    }

    #[test]
    fn padded_to_string_strips_padding() {
        assert_eq!(padded_to_string(b"TESTMACH\0\0\0\0\0\0\0\0"), "TESTMACH");
        assert_eq!(padded_to_string(b"FULLWIDTHNAME..."), "FULLWIDTHNAME...");
    }
}
