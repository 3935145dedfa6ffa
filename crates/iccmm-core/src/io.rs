//! Byte sources and sinks
//!
//! Everything in the engine that touches raw profile bytes goes through this
//! module. [`IccIo`] is the seekable source/sink contract with two backends,
//! [`MemIo`] and [`FileIo`]. Tag payloads are decoded from in-memory slices
//! with [`ByteReader`] and encoded with the [`BeWrite`] helpers.
//!
//! All multi-byte numbers are big-endian.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

/// Byte-level I/O failure
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IoError {
    /// Fewer bytes were available than requested
    #[error("short read: wanted {wanted} bytes, {available} available")]
    UnexpectedEof { wanted: usize, available: usize },

    /// Write would exceed the fixed capacity of a memory buffer
    #[error("write of {len} bytes at {pos} exceeds capacity {capacity}")]
    CapacityExceeded {
        pos: usize,
        len: usize,
        capacity: usize,
    },

    /// Underlying file error
    #[error("I/O error: {0}")]
    Std(#[from] std::io::Error),
}

/// Seekable byte source/sink
///
/// `read` never returns content past the end of the data; a short count is
/// the end-of-data signal. The typed helpers turn a short read into
/// [`IoError::UnexpectedEof`].
pub trait IccIo: Send {
    /// Read up to `buf.len()` bytes, returning how many were read
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError>;

    /// Write all of `buf`, returning the count written
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError>;

    /// Move the cursor. Returns false if the target is outside `[0, len]`.
    fn seek(&mut self, pos: SeekFrom) -> bool;

    /// Current cursor position
    fn tell(&self) -> u64;

    /// Total length of the data
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` completely or fail with `UnexpectedEof`
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), IoError> {
        let n = self.read(buf)?;
        if n < buf.len() {
            return Err(IoError::UnexpectedEof {
                wanted: buf.len(),
                available: n,
            });
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, IoError> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_u16(&mut self) -> Result<u16, IoError> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    fn read_u32(&mut self) -> Result<u32, IoError> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    fn read_f32(&mut self) -> Result<f32, IoError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    fn write_u16(&mut self, v: u16) -> Result<(), IoError> {
        self.write(&v.to_be_bytes()).map(|_| ())
    }

    fn write_u32(&mut self, v: u32) -> Result<(), IoError> {
        self.write(&v.to_be_bytes()).map(|_| ())
    }

    /// Pad with zeros until the cursor is a multiple of four
    fn align_write(&mut self) -> Result<(), IoError> {
        let pad = (4 - (self.tell() % 4) as usize) % 4;
        if pad > 0 {
            self.write(&[0u8; 3][..pad])?;
        }
        Ok(())
    }
}

/// In-memory byte buffer bounded by its capacity
#[derive(Debug, Clone, Default)]
pub struct MemIo {
    data: Vec<u8>,
    pos: usize,
    capacity: usize,
}

impl MemIo {
    /// Empty writable buffer that may hold at most `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
            capacity,
        }
    }

    /// Empty writable buffer without a capacity bound
    pub fn growable() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// Buffer over existing bytes. Writes may overwrite but never grow it.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let capacity = data.len();
        Self {
            data,
            pos: 0,
            capacity,
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl IccIo for MemIo {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let available = self.data.len().saturating_sub(self.pos);
        let n = buf.len().min(available);
        if n == 0 {
            return Ok(0);
        }
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        let end = self
            .pos
            .checked_add(buf.len())
            .filter(|&end| end <= self.capacity)
            .ok_or(IoError::CapacityExceeded {
                pos: self.pos,
                len: buf.len(),
                capacity: self.capacity,
            })?;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> bool {
        let target = match pos {
            SeekFrom::Start(p) => i128::from(p),
            SeekFrom::Current(d) => self.pos as i128 + i128::from(d),
            SeekFrom::End(d) => self.data.len() as i128 + i128::from(d),
        };
        if target < 0 || target > self.data.len() as i128 {
            return false;
        }
        self.pos = target as usize;
        true
    }

    fn tell(&self) -> u64 {
        self.pos as u64
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

/// File-backed byte stream
#[derive(Debug)]
pub struct FileIo {
    file: File,
    pos: u64,
    len: u64,
}

impl FileIo {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, pos: 0, len })
    }

    pub fn create(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file, pos: 0, len: 0 })
    }
}

impl IccIo for FileIo {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        self.pos += total as u64;
        Ok(total)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        self.file.write_all(buf)?;
        self.pos += buf.len() as u64;
        self.len = self.len.max(self.pos);
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> bool {
        let target = match pos {
            SeekFrom::Start(p) => i128::from(p),
            SeekFrom::Current(d) => i128::from(self.pos) + i128::from(d),
            SeekFrom::End(d) => i128::from(self.len) + i128::from(d),
        };
        if target < 0 || target > i128::from(self.len) {
            return false;
        }
        match self.file.seek(SeekFrom::Start(target as u64)) {
            Ok(p) => {
                self.pos = p;
                true
            }
            Err(_) => false,
        }
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn len(&self) -> u64 {
        self.len
    }
}

/// Cursor over an in-memory tag payload
///
/// Reads past the end fail with `UnexpectedEof` and leave the cursor
/// where it was.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Jump to an absolute position inside the slice
    pub fn seek_to(&mut self, pos: usize) -> Result<(), IoError> {
        if pos > self.data.len() {
            return Err(IoError::UnexpectedEof {
                wanted: pos,
                available: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), IoError> {
        self.bytes(n).map(|_| ())
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], IoError> {
        if n > self.remaining() {
            return Err(IoError::UnexpectedEof {
                wanted: n,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], IoError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, IoError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, IoError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, IoError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, IoError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, IoError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32, IoError> {
        Ok(f32::from_bits(self.u32()?))
    }

    /// s15Fixed16Number as f32
    pub fn s15f16(&mut self) -> Result<f32, IoError> {
        Ok(self.i32()? as f32 / 65536.0)
    }

    /// Read `count` values with `f`, refusing counts the remaining bytes
    /// cannot possibly satisfy before allocating.
    pub fn array_of<T>(
        &mut self,
        count: usize,
        elem_size: usize,
        mut f: impl FnMut(&mut Self) -> Result<T, IoError>,
    ) -> Result<Vec<T>, IoError> {
        let needed = count.saturating_mul(elem_size);
        if needed > self.remaining() {
            return Err(IoError::UnexpectedEof {
                wanted: needed,
                available: self.remaining(),
            });
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(f(self)?);
        }
        Ok(out)
    }
}

/// Big-endian append helpers for building tag payloads
pub trait BeWrite {
    fn put_u8(&mut self, v: u8);
    fn put_u16(&mut self, v: u16);
    fn put_u32(&mut self, v: u32);
    fn put_u64(&mut self, v: u64);
    fn put_f32(&mut self, v: f32);
    fn put_s15f16(&mut self, v: f32);
    fn put_zeros(&mut self, n: usize);
    /// Pad with zeros to a multiple of four
    fn pad4(&mut self);
}

impl BeWrite for Vec<u8> {
    fn put_u8(&mut self, v: u8) {
        self.push(v);
    }

    fn put_u16(&mut self, v: u16) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_f32(&mut self, v: f32) {
        self.put_u32(v.to_bits());
    }

    fn put_s15f16(&mut self, v: f32) {
        let raw = (f64::from(v) * 65536.0).round();
        let raw = if raw.is_nan() {
            0
        } else {
            raw.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
        };
        self.extend_from_slice(&raw.to_be_bytes());
    }

    fn put_zeros(&mut self, n: usize) {
        self.resize(self.len() + n, 0);
    }

    fn pad4(&mut self) {
        let pad = (4 - self.len() % 4) % 4;
        self.put_zeros(pad);
    }
}
