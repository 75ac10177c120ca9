use crate::{
    consts::{QOIF_END_MARKER, QOIF_HEADER_SIZE},
    header::{HeaderError, ImageDescriptor},
    io::{QoifRead, SliceReader},
    opcode::{OpTag, Opcode},
    Pixel, QoifContext,
};
use core::iter::FusedIterator;
use snafu::{ensure, ResultExt, Snafu};
use std::io;
use tracing::debug;

mod ops;

#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("failed to parse header"))]
    Header { source: HeaderError },
    #[snafu(display("unexpected end of input at byte {offset}"))]
    UnexpectedEof { offset: u64 },
    #[snafu(display("missing or invalid end marker"))]
    InvalidEndMarker,
    #[snafu(display("decoding already failed"))]
    Poisoned,
    #[snafu(display("failed to read encoded data"))]
    ReadIo { source: io::Error },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DecodeOptions {
    /// Verify the end marker in [`Pixels::finish`].
    pub strict: bool,
}

/// Parses the header from `reader` and returns it with a lazy iterator over the pixels.
pub fn decode<R: QoifRead>(reader: R) -> Result<(ImageDescriptor, Pixels<R>), DecodeError> {
    decode_with_options(reader, DecodeOptions::default())
}

pub fn decode_with_options<R: QoifRead>(
    mut reader: R,
    options: DecodeOptions,
) -> Result<(ImageDescriptor, Pixels<R>), DecodeError> {
    let mut header = [0; QOIF_HEADER_SIZE];
    let len = reader.read_up_to(&mut header).context(ReadIoSnafu)?;
    let descriptor = ImageDescriptor::from_header_bytes(&header[..len]).context(HeaderSnafu)?;

    debug!(
        width = descriptor.width,
        height = descriptor.height,
        channels = descriptor.channels.count(),
        colorspace = ?descriptor.colorspace,
        "parsed header"
    );

    let pixels = Pixels {
        reader,
        ctx: QoifContext::new(),
        descriptor,
        remaining: descriptor.pixel_count(),
        strict: options.strict,
        failed: false,
    };

    Ok((descriptor, pixels))
}

/// Decodes a complete in-memory stream.
pub fn decode_to_vec(data: &[u8]) -> Result<(ImageDescriptor, Vec<Pixel>), DecodeError> {
    let (descriptor, mut pixels) = decode(SliceReader::new(data))?;

    // A single input byte describes at most 62 pixels.
    let capacity = descriptor.pixel_count().min(data.len() as u64 * 62);
    let mut output = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));
    for pixel in pixels.by_ref() {
        output.push(pixel?);
    }
    pixels.finish()?;

    Ok((descriptor, output))
}

/// Lazily decoded pixels of one image, in row-major order.
///
/// Yields exactly `width * height` pixels unless an error occurs, after which it yields nothing.
/// Each pixel advances the underlying reader; the sequence can't be restarted.
#[derive(Debug)]
pub struct Pixels<R> {
    reader: R,
    ctx: QoifContext,
    descriptor: ImageDescriptor,
    remaining: u64,
    strict: bool,
    failed: bool,
}

impl<R: QoifRead> Pixels<R> {
    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    /// Number of pixels not yet yielded.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Bytes consumed from the reader so far, header included.
    pub fn bytes_read(&self) -> u64 {
        self.reader.bytes_read()
    }

    /// Abandons decoding and returns the reader at its current position.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Decodes any remaining pixels, checks the end marker if decoding is strict, and returns
    /// the reader positioned after the stream.
    pub fn finish(mut self) -> Result<R, DecodeError> {
        ensure!(!self.failed, PoisonedSnafu);

        for pixel in self.by_ref() {
            pixel?;
        }

        if self.strict {
            let mut end = [0; QOIF_END_MARKER.len()];
            let len = self.reader.read_up_to(&mut end).context(ReadIoSnafu)?;
            ensure!(
                len == end.len() && end == QOIF_END_MARKER,
                InvalidEndMarkerSnafu
            );
        }

        debug!(bytes = self.reader.bytes_read(), "decoded image");

        Ok(self.reader)
    }

    fn unexpected_eof(&self) -> DecodeError {
        DecodeError::UnexpectedEof {
            offset: self.reader.bytes_read(),
        }
    }

    fn decode_next(&mut self) -> Result<Pixel, DecodeError> {
        if self.ctx.run > 0 {
            self.ctx.run -= 1;
            return Ok(self.ctx.prev);
        }

        let byte = match self.reader.next_byte().context(ReadIoSnafu)? {
            Some(byte) => byte,
            None => return Err(self.unexpected_eof()),
        };

        let len = OpTag::from_byte(byte).payload_len();
        let mut payload = [0; Opcode::MAX_LEN - 1];
        if len > 0 && self.reader.read_up_to(&mut payload[..len]).context(ReadIoSnafu)? < len {
            return Err(self.unexpected_eof());
        }

        let pixel = ops::apply(&mut self.ctx, Opcode::parse(byte, &payload[..len]));

        // Runs refresh the slot of the repeated pixel as well.
        self.ctx.remember(pixel);
        self.ctx.prev = pixel;

        Ok(pixel)
    }
}

impl<R: QoifRead> Iterator for Pixels<R> {
    type Item = Result<Pixel, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.failed {
            return None;
        }

        match self.decode_next() {
            Ok(pixel) => {
                self.remaining -= 1;
                Some(Ok(pixel))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }

        (0, usize::try_from(self.remaining).ok())
    }
}

impl<R: QoifRead> FusedIterator for Pixels<R> {}
