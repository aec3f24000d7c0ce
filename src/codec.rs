//! Примитивный кодек поверх SnapshotStream. Wire order — little-endian,
//! независимо от хоста.
//!
//! Что здесь:
//! - скаляры u8/u16/u32 и f64 (фиксированные 8 байт, LE IEEE-754);
//! - массивы скаляров;
//! - строки: padded fixed-width и length-prefixed (u16-префикс включает NUL).
//!
//! Ошибки отдаются голым kind'ом без контекста; имя модуля и файла
//! прикрепляют верхние слои (container/module).

use byteorder::{ByteOrder, LittleEndian};
use std::io;

use crate::error::{Result, SnapshotError, SnapshotErrorKind};
use crate::stream::SnapshotStream;

#[inline]
fn write_eof(e: io::Error) -> SnapshotError {
    SnapshotError::new(SnapshotErrorKind::WriteEof).with_source(e)
}

#[inline]
fn read_eof(e: io::Error) -> SnapshotError {
    SnapshotError::new(SnapshotErrorKind::ReadEof).with_source(e)
}

#[inline]
fn write_arr(e: io::Error) -> SnapshotError {
    SnapshotError::new(SnapshotErrorKind::WriteArray).with_source(e)
}

#[inline]
fn read_arr(e: io::Error) -> SnapshotError {
    SnapshotError::new(SnapshotErrorKind::ReadArray).with_source(e)
}

// -------- Скаляры --------

pub fn write_u8(s: &mut dyn SnapshotStream, v: u8) -> Result<()> {
    s.write(&[v]).map_err(write_eof)
}

pub fn write_u16(s: &mut dyn SnapshotStream, v: u16) -> Result<()> {
    let mut b = [0u8; 2];
    LittleEndian::write_u16(&mut b, v);
    s.write(&b).map_err(write_eof)
}

pub fn write_u32(s: &mut dyn SnapshotStream, v: u32) -> Result<()> {
    let mut b = [0u8; 4];
    LittleEndian::write_u32(&mut b, v);
    s.write(&b).map_err(write_eof)
}

pub fn write_f64(s: &mut dyn SnapshotStream, v: f64) -> Result<()> {
    let mut b = [0u8; 8];
    LittleEndian::write_f64(&mut b, v);
    s.write(&b).map_err(write_eof)
}

pub fn read_u8(s: &mut dyn SnapshotStream) -> Result<u8> {
    let mut b = [0u8; 1];
    s.read(&mut b).map_err(read_eof)?;
    Ok(b[0])
}

pub fn read_u16(s: &mut dyn SnapshotStream) -> Result<u16> {
    let mut b = [0u8; 2];
    s.read(&mut b).map_err(read_eof)?;
    Ok(LittleEndian::read_u16(&b))
}

pub fn read_u32(s: &mut dyn SnapshotStream) -> Result<u32> {
    let mut b = [0u8; 4];
    s.read(&mut b).map_err(read_eof)?;
    Ok(LittleEndian::read_u32(&b))
}

pub fn read_f64(s: &mut dyn SnapshotStream) -> Result<f64> {
    let mut b = [0u8; 8];
    s.read(&mut b).map_err(read_eof)?;
    Ok(LittleEndian::read_f64(&b))
}

// -------- Массивы --------

pub fn write_u8_array(s: &mut dyn SnapshotStream, vals: &[u8]) -> Result<()> {
    s.write(vals).map_err(write_arr)
}

pub fn write_u16_array(s: &mut dyn SnapshotStream, vals: &[u16]) -> Result<()> {
    for &v in vals {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        s.write(&b).map_err(write_arr)?;
    }
    Ok(())
}

pub fn write_u32_array(s: &mut dyn SnapshotStream, vals: &[u32]) -> Result<()> {
    for &v in vals {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        s.write(&b).map_err(write_arr)?;
    }
    Ok(())
}

pub fn read_u8_array(s: &mut dyn SnapshotStream, out: &mut [u8]) -> Result<()> {
    s.read(out).map_err(read_arr)
}

pub fn read_u16_array(s: &mut dyn SnapshotStream, out: &mut [u16]) -> Result<()> {
    for v in out.iter_mut() {
        let mut b = [0u8; 2];
        s.read(&mut b).map_err(read_arr)?;
        *v = LittleEndian::read_u16(&b);
    }
    Ok(())
}

pub fn read_u32_array(s: &mut dyn SnapshotStream, out: &mut [u32]) -> Result<()> {
    for v in out.iter_mut() {
        let mut b = [0u8; 4];
        s.read(&mut b).map_err(read_arr)?;
        *v = LittleEndian::read_u32(&b);
    }
    Ok(())
}

// -------- Строки --------

/// Записать строку в поле фиксированной ширины `len`: байты источника до
/// первого NUL (или до конца поля), остаток добит `pad`. Более длинный
/// источник молча обрезается.
pub fn write_padded_string(
    s: &mut dyn SnapshotStream,
    v: &str,
    len: usize,
    pad: u8,
) -> Result<()> {
    let src = v.as_bytes();
    let used = src
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(src.len())
        .min(len);
    let mut buf = vec![pad; len];
    buf[..used].copy_from_slice(&src[..used]);
    s.write(&buf).map_err(write_eof)
}

/// Записать length-prefixed строку: u16-префикс = длина + NUL-терминатор,
/// затем тело с терминатором. None кодируется нулевым префиксом без тела.
/// Возвращает полное число записанных байт (для учёта размера модуля).
pub fn write_string(s: &mut dyn SnapshotStream, v: Option<&str>) -> Result<u64> {
    let v = match v {
        None => {
            write_u16(s, 0)?;
            return Ok(2);
        }
        Some(v) => v,
    };
    let bytes = v.as_bytes();
    let full = bytes
        .len()
        .checked_add(1)
        .filter(|&n| n <= u16::MAX as usize)
        .ok_or_else(|| SnapshotError::new(SnapshotErrorKind::StringTooLong))?;
    write_u16(s, full as u16)?;
    let mut payload = Vec::with_capacity(full);
    payload.extend_from_slice(bytes);
    payload.push(0);
    s.write(&payload).map_err(write_eof)?;
    Ok(2 + full as u64)
}

/// Прочитать тело length-prefixed строки (`len` > 0 байт, включая NUL).
/// Последний байт терминируется принудительно, содержимому не доверяем.
pub fn read_string_body(s: &mut dyn SnapshotStream, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    s.read(&mut buf).map_err(read_eof)?;
    buf[len - 1] = 0;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(len - 1);
    buf.truncate(end);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
