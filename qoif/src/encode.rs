use crate::{
    consts::QOIF_MAX_RUN,
    header::{Channels, DescriptorError, ImageDescriptor},
    io::{QoifWrite, VecWriter},
    opcode::Opcode,
    Pixel, QoifContext,
};
use snafu::{ensure, ResultExt, Snafu};
use std::io;
use tracing::debug;

#[derive(Debug, Snafu)]
pub enum EncodeError {
    #[snafu(display("invalid image descriptor"))]
    InvalidDescriptor { source: DescriptorError },
    #[snafu(display("pixel source yielded more than the {expected} pixels the descriptor specifies"))]
    TooManyPixels { expected: u64 },
    #[snafu(display(
        "pixel source yielded {actual} pixels, but the descriptor specifies {expected}"
    ))]
    TooFewPixels { expected: u64, actual: u64 },
    #[snafu(display("failed to write encoded data"))]
    WriteIo { source: io::Error },
}

/// Encodes `pixels` (row-major) as a complete QOIF stream into `w`.
///
/// Pixels of 3-channel images are treated as opaque, whatever alpha they carry. On error, the
/// bytes already handed to `w` stay there.
pub fn encode<I, W>(pixels: I, descriptor: &ImageDescriptor, w: W) -> Result<(), EncodeError>
where
    I: IntoIterator,
    I::Item: Into<Pixel>,
    W: QoifWrite,
{
    let mut ctx = QoifContext::new();
    ctx.encode_with_state(pixels, descriptor, w)
}

/// Encodes `pixels` into a buffer sized for the worst case of `descriptor`.
pub fn encode_to_vec<I>(pixels: I, descriptor: &ImageDescriptor) -> Result<Vec<u8>, EncodeError>
where
    I: IntoIterator,
    I::Item: Into<Pixel>,
{
    descriptor.validate().context(InvalidDescriptorSnafu)?;

    let mut w = VecWriter::with_capacity_for(descriptor);
    encode(pixels, descriptor, &mut w)?;
    Ok(w.into_inner())
}

impl QoifContext {
    /// Like [`encode`], but starting from the given state instead of a fresh one.
    pub fn encode_with_state<I, W>(
        &mut self,
        pixels: I,
        descriptor: &ImageDescriptor,
        mut w: W,
    ) -> Result<(), EncodeError>
    where
        I: IntoIterator,
        I::Item: Into<Pixel>,
        W: QoifWrite,
    {
        descriptor.validate().context(InvalidDescriptorSnafu)?;

        w.write_header(descriptor).context(WriteIoSnafu)?;
        self.encode_pixels(pixels, descriptor, &mut w)?;
        w.write_end().context(WriteIoSnafu)?;

        debug!(
            width = descriptor.width,
            height = descriptor.height,
            channels = descriptor.channels.count(),
            bytes = w.bytes_written(),
            "encoded image"
        );

        Ok(())
    }

    /// Encodes the stream body, without header and end marker.
    pub fn encode_pixels<I, W>(
        &mut self,
        pixels: I,
        descriptor: &ImageDescriptor,
        w: &mut W,
    ) -> Result<(), EncodeError>
    where
        I: IntoIterator,
        I::Item: Into<Pixel>,
        W: QoifWrite + ?Sized,
    {
        let expected = descriptor.pixel_count();
        let opaque = descriptor.channels == Channels::Rgb;
        let mut seen = 0u64;

        for pixel in pixels {
            let mut pixel: Pixel = pixel.into();
            if opaque {
                pixel.a = 255;
            }

            seen += 1;
            ensure!(seen <= expected, TooManyPixelsSnafu { expected });

            if pixel == self.prev {
                self.run += 1;
                if self.run == QOIF_MAX_RUN || seen == expected {
                    self.flush_run(w)?;
                }

                // already same as prev and already in color array
                continue;
            }

            self.flush_run(w)?;

            let index = pixel.hash();
            let op = if self.arr[usize::from(index)] == pixel {
                Opcode::Index(index)
            } else {
                self.arr[usize::from(index)] = pixel;
                Opcode::for_delta(self.prev, pixel)
            };

            w.write_op(op).context(WriteIoSnafu)?;
            self.prev = pixel;
        }

        self.flush_run(w)?;

        ensure!(
            seen == expected,
            TooFewPixelsSnafu {
                expected,
                actual: seen
            }
        );

        Ok(())
    }

    fn flush_run<W: QoifWrite + ?Sized>(&mut self, w: &mut W) -> Result<(), EncodeError> {
        if self.run > 0 {
            w.write_op(Opcode::Run(self.run)).context(WriteIoSnafu)?;
            self.run = 0;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{consts::*, io::StreamWriter, Colorspace};

    fn rgba(width: u32, height: u32) -> ImageDescriptor {
        ImageDescriptor::new(width, height, Channels::Rgba, Colorspace::Srgb).unwrap()
    }

    /// Encoded body, without header and end marker.
    fn body(pixels: &[Pixel], descriptor: &ImageDescriptor) -> Vec<u8> {
        let encoded = encode_to_vec(pixels.iter().copied(), descriptor).unwrap();
        encoded[QOIF_HEADER_SIZE..encoded.len() - QOIF_END_MARKER.len()].to_vec()
    }

    #[test]
    fn writes_header_and_end_marker() {
        let pixels = [Pixel::new(1, 2, 3, 4); 4];
        let encoded = encode_to_vec(pixels, &rgba(4, 1)).unwrap();

        assert_eq!(
            &encoded[..QOIF_HEADER_SIZE],
            &[0x71, 0x6F, 0x69, 0x66, 0, 0, 0, 4, 0, 0, 0, 1, 4, 0]
        );
        assert_eq!(&encoded[encoded.len() - 8..], &QOIF_END_MARKER);
    }

    #[test]
    fn first_pixel_matching_start_is_a_run() {
        let pixels = [Pixel::START; 3];
        assert_eq!(body(&pixels, &rgba(3, 1)), [QOIF_OP_RUN | 2]);
    }

    #[test]
    fn run_is_capped() {
        let mut pixels = vec![Pixel::START; 62];
        pixels.push(Pixel::new(0, 0, 1, 255));
        let descriptor = rgba(63, 1);

        assert_eq!(
            body(&pixels, &descriptor),
            [QOIF_OP_RUN | 61, QOIF_OP_DIFF | 0b10_10_11]
        );

        let pixels = vec![Pixel::START; 130];
        assert_eq!(
            body(&pixels, &rgba(130, 1)),
            [QOIF_OP_RUN | 61, QOIF_OP_RUN | 61, QOIF_OP_RUN | 5]
        );
    }

    #[test]
    fn diff_before_luma_before_rgb() {
        let pixels = [
            Pixel::new(10, 10, 10, 255),
            Pixel::new(11, 10, 9, 255),
            Pixel::new(21, 15, 12, 255),
            Pixel::new(221, 15, 12, 255),
        ];
        let out = body(&pixels, &rgba(4, 1));

        assert_eq!(
            out,
            [
                QOIF_OP_LUMA | (10 + 32),
                ((0 + 8) << 4) | (0 + 8),
                QOIF_OP_DIFF | (3 << 4) | (2 << 2) | 1,
                QOIF_OP_LUMA | (5 + 32),
                ((5 + 8) << 4) | (-2i8 + 8) as u8,
                QOIF_OP_RGB,
                221,
                15,
                12,
            ]
        );
    }

    #[test]
    fn alpha_change_forces_rgba() {
        let pixels = [Pixel::new(0, 0, 0, 254)];
        assert_eq!(body(&pixels, &rgba(1, 1)), [QOIF_OP_RGBA, 0, 0, 0, 254]);
    }

    #[test]
    fn index_on_cache_hit() {
        let a = Pixel::new(100, 0, 0, 255);
        let b = Pixel::new(0, 100, 0, 255);
        assert_ne!(a.hash(), b.hash());

        let out = body(&[a, b, a], &rgba(3, 1));
        assert_eq!(out[out.len() - 1], QOIF_OP_INDEX | a.hash());
    }

    #[test]
    fn evicted_pixel_is_not_indexed() {
        // red * 3 is a multiple of 64 for both, so they share a slot
        let x = Pixel::new(64, 0, 0, 255);
        let z = Pixel::new(128, 0, 0, 255);
        assert_eq!(x.hash(), z.hash());

        let out = body(&[x, z, x], &rgba(3, 1));
        assert_eq!(
            out,
            [
                QOIF_OP_RGB,
                64,
                0,
                0,
                QOIF_OP_RGB,
                128,
                0,
                0,
                QOIF_OP_RGB,
                64,
                0,
                0
            ]
        );
    }

    #[test]
    fn rgb_images_ignore_source_alpha() {
        let descriptor = ImageDescriptor::new(2, 1, Channels::Rgb, Colorspace::Srgb).unwrap();
        let out = body(&[Pixel::new(0, 0, 0, 3), Pixel::new(0, 0, 0, 9)], &descriptor);
        assert_eq!(out, [QOIF_OP_RUN | 1]);
    }

    #[test]
    fn pixel_count_must_match() {
        let descriptor = rgba(2, 2);
        assert!(matches!(
            encode_to_vec([Pixel::START; 3], &descriptor),
            Err(EncodeError::TooFewPixels {
                expected: 4,
                actual: 3
            })
        ));
        assert!(matches!(
            encode_to_vec([Pixel::START; 5], &descriptor),
            Err(EncodeError::TooManyPixels { expected: 4 })
        ));
    }

    #[test]
    fn rejects_invalid_descriptor() {
        let descriptor = ImageDescriptor {
            width: 0,
            height: 3,
            channels: Channels::Rgb,
            colorspace: Colorspace::Srgb,
        };
        let mut w = VecWriter::new();

        assert!(matches!(
            encode(std::iter::empty::<Pixel>(), &descriptor, &mut w),
            Err(EncodeError::InvalidDescriptor {
                source: DescriptorError::ZeroDimension { .. }
            })
        ));
        assert_eq!(w.bytes_written(), 0);
    }

    /// Accepts a fixed number of `write` calls, then reports a full disk.
    struct FullDisk {
        accepted: Vec<u8>,
        writes_left: usize,
    }

    impl io::Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.writes_left == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left"));
            }

            self.writes_left -= 1;
            self.accepted.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_keeps_partial_output() {
        // alternating alpha makes every one of the first 256 pixels a 5 byte RGBA op
        let pixels: Vec<Pixel> = (0..400u32)
            .map(|i| Pixel::new(i as u8, (i * 7) as u8, 0, 100 + (i % 2) as u8))
            .collect();
        let descriptor = rgba(20, 20);
        let full = encode_to_vec(pixels.iter().copied(), &descriptor).unwrap();

        let mut w = StreamWriter::new(FullDisk {
            accepted: Vec::new(),
            writes_left: 1,
        });
        let err = encode(pixels.iter().copied(), &descriptor, &mut w).unwrap_err();

        match err {
            EncodeError::WriteIo { source } => assert_eq!(source.kind(), io::ErrorKind::Other),
            other => panic!("expected a write error, got {other:?}"),
        }

        let accepted = &w.get_ref().accepted;
        assert!(accepted.len() >= 1004);
        assert!(accepted.len() < full.len());
        assert_eq!(accepted[..], full[..accepted.len()]);
    }

    #[test]
    fn separate_passes_are_identical() {
        let pixels: Vec<Pixel> = (0..64u8)
            .map(|i| Pixel::new(i.wrapping_mul(37), i, 255 - i, 200 + i % 3))
            .collect();
        let descriptor = rgba(8, 8);

        let first = encode_to_vec(pixels.iter().copied(), &descriptor).unwrap();
        let second = encode_to_vec(pixels.iter().copied(), &descriptor).unwrap();
        assert_eq!(first, second);
    }
}
