//! Byte sinks and sources the codec runs against.
//!
//! The encoder only ever appends to a [`QoifWrite`], the decoder only ever pulls single bytes
//! from a [`QoifRead`]. In-memory and [`std::io`] backed implementations are provided.

use crate::{consts::QOIF_END_MARKER, header::ImageDescriptor, opcode::Opcode};
use std::io::{self, ErrorKind, Read, Write};
use tracing::trace;

/// Append-only byte sink.
pub trait QoifWrite {
    /// Appends raw bytes.
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Total number of bytes accepted so far.
    fn bytes_written(&self) -> u64;

    /// Pushes buffered bytes to the underlying storage.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn write_header(&mut self, descriptor: &ImageDescriptor) -> io::Result<()> {
        self.write_bytes(&descriptor.to_header_bytes())
    }

    fn write_op(&mut self, op: Opcode) -> io::Result<()> {
        let mut buf = [0; Opcode::MAX_LEN];
        let len = op.encode_into(&mut buf);
        self.write_bytes(&buf[..len])
    }

    /// Writes the end marker and flushes.
    fn write_end(&mut self) -> io::Result<()> {
        self.write_bytes(&QOIF_END_MARKER)?;
        self.flush()
    }
}

impl<W: QoifWrite + ?Sized> QoifWrite for &mut W {
    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_bytes(bytes)
    }

    #[inline]
    fn bytes_written(&self) -> u64 {
        (**self).bytes_written()
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Pull-based byte source.
pub trait QoifRead {
    /// Returns the next byte, or `None` once the input is exhausted.
    fn next_byte(&mut self) -> io::Result<Option<u8>>;

    /// Total number of bytes consumed so far.
    fn bytes_read(&self) -> u64;

    /// Fills as much of `buf` as the input allows and returns how many bytes were read.
    ///
    /// A return value smaller than `buf.len()` means the input ended.
    fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        for (filled, slot) in buf.iter_mut().enumerate() {
            match self.next_byte()? {
                Some(byte) => *slot = byte,
                None => return Ok(filled),
            }
        }

        Ok(buf.len())
    }
}

impl<R: QoifRead + ?Sized> QoifRead for &mut R {
    #[inline]
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).next_byte()
    }

    #[inline]
    fn bytes_read(&self) -> u64 {
        (**self).bytes_read()
    }

    #[inline]
    fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_up_to(buf)
    }
}

/// Writes into a growable in-memory buffer.
#[derive(Debug, Default, Clone)]
pub struct VecWriter {
    buf: Vec<u8>,
}

impl VecWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves enough space for the worst-case encoding of `descriptor`, so encoding never
    /// reallocates.
    pub fn with_capacity_for(descriptor: &ImageDescriptor) -> Self {
        let capacity = usize::try_from(descriptor.max_encoded_len()).unwrap_or(usize::MAX);
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl QoifWrite for VecWriter {
    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    #[inline]
    fn bytes_written(&self) -> u64 {
        self.buf.len() as u64
    }
}

const STREAM_BUFFER_SIZE: usize = 1024;
/// Room kept free in the buffer after each write, enough for several operations.
const STREAM_BUFFER_HEADROOM: usize = 20;

/// Buffers operations and writes them to a [`Write`] in chunks of about 1 KiB.
#[derive(Debug)]
pub struct StreamWriter<W> {
    inner: W,
    buf: [u8; STREAM_BUFFER_SIZE],
    pos: usize,
    flushed: u64,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: [0; STREAM_BUFFER_SIZE],
            pos: 0,
            flushed: 0,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flushes any buffered bytes and returns the underlying stream.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush_buffer()?;
        Ok(self.inner)
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        if self.pos == 0 {
            return Ok(());
        }

        trace!(bytes = self.pos, "flushing stream writer buffer");
        self.inner.write_all(&self.buf[..self.pos])?;
        self.flushed += self.pos as u64;
        self.pos = 0;

        Ok(())
    }
}

impl<W: Write> QoifWrite for StreamWriter<W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.len() > STREAM_BUFFER_SIZE - self.pos {
            self.flush_buffer()?;
        }

        if bytes.len() > STREAM_BUFFER_SIZE {
            self.inner.write_all(bytes)?;
            self.flushed += bytes.len() as u64;
            return Ok(());
        }

        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();

        if self.pos + STREAM_BUFFER_HEADROOM >= STREAM_BUFFER_SIZE {
            self.flush_buffer()?;
        }

        Ok(())
    }

    #[inline]
    fn bytes_written(&self) -> u64 {
        self.flushed + self.pos as u64
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.inner.flush()
    }
}

/// Reads from a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// The bytes not consumed yet.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl QoifRead for SliceReader<'_> {
    #[inline]
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.data.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        Ok(byte)
    }

    #[inline]
    fn bytes_read(&self) -> u64 {
        self.pos as u64
    }

    fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let rest = self.remaining();
        let len = rest.len().min(buf.len());
        buf[..len].copy_from_slice(&rest[..len]);
        self.pos += len;
        Ok(len)
    }
}

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads from a [`Read`] through an internal chunk buffer.
///
/// Bytes pulled from the inner reader but not consumed by the decoder stay in the buffer, so
/// [`bytes_read`](QoifRead::bytes_read) reports the decoder's cursor, not the inner reader's.
#[derive(Debug)]
pub struct StreamReader<R> {
    inner: R,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    consumed: u64,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: vec![0; READ_CHUNK_SIZE].into_boxed_slice(),
            start: 0,
            end: 0,
            consumed: 0,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Returns the underlying stream. Buffered but unconsumed bytes are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Refills the buffer, returning `false` at end of input.
    fn fill(&mut self) -> io::Result<bool> {
        loop {
            match self.inner.read(&mut self.buf) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.start = 0;
                    self.end = n;
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl<R: Read> QoifRead for StreamReader<R> {
    #[inline]
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        if self.start == self.end && !self.fill()? {
            return Ok(None);
        }

        let byte = self.buf[self.start];
        self.start += 1;
        self.consumed += 1;
        Ok(Some(byte))
    }

    #[inline]
    fn bytes_read(&self) -> u64 {
        self.consumed
    }
}
