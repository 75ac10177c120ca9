//! Streaming implementation of the QOIF ("Quite OK Image Format") lossless image codec.
//!
//! A QOIF stream consists of a 14-byte header, a body of tagged operations describing how to
//! derive each pixel from the previous one, and an 8-byte end marker.
//!
//! # Header
//!
//! - 4-byte magic: `qoif`
//! - u32be width (non-zero)
//! - u32be height (non-zero)
//! - u8 channels (3 = RGB, 4 = RGBA)
//! - u8 colorspace (0 = sRGB with linear alpha, 1 = all channels linear)
//!
//! The channel count and colorspace are informative only; the body always describes RGBA8
//! pixels.
//!
//! # Color array
//!
//! Encoder and decoder both keep a 64-entry array of previously seen pixels, indexed by
//! `(r * 3 + g * 5 + b * 7 + a * 11) % 64`. Every pixel that is not part of a run and not
//! itself emitted as [`QOIF_OP_INDEX`](consts::QOIF_OP_INDEX) is written to its slot.
//!
//! # Stream format
//!
//! See [consts] for the different operation types and [`Opcode`] for their decoded form.
//!
//! # Usage
//!
//! ```
//! use qoif::{Channels, Colorspace, ImageDescriptor, Pixel};
//!
//! let descriptor = ImageDescriptor::new(2, 1, Channels::Rgba, Colorspace::Srgb).unwrap();
//! let pixels = [Pixel::new(255, 0, 0, 255), Pixel::new(0, 0, 255, 128)];
//!
//! let encoded = qoif::encode_to_vec(pixels, &descriptor).unwrap();
//! let (header, decoded) = qoif::decode_to_vec(&encoded).unwrap();
//!
//! assert_eq!(header, descriptor);
//! assert_eq!(decoded, pixels);
//! ```

pub mod decode;
pub mod encode;
pub mod header;
pub mod io;
pub mod opcode;
pub mod utils;

pub use decode::{decode, decode_to_vec, decode_with_options, DecodeError, DecodeOptions, Pixels};
pub use encode::{encode, encode_to_vec, EncodeError};
pub use header::{Channels, Colorspace, DescriptorError, HeaderError, ImageDescriptor};
pub use opcode::{OpTag, Opcode};

use utils::hash;

/// A single RGBA8 pixel.
///
/// 3-channel images carry an alpha of 255 on every pixel.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    /// Value of every color array slot at the start of a pass.
    pub const ZERO: Pixel = Pixel::new(0, 0, 0, 0);
    /// Value of the "previous pixel" at the start of a pass.
    pub const START: Pixel = Pixel::new(0, 0, 0, 255);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    pub const fn from_rgb([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b, 255)
    }

    #[inline]
    pub const fn from_rgba([r, g, b, a]: [u8; 4]) -> Self {
        Self::new(r, g, b, a)
    }

    #[inline]
    pub const fn to_rgb(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    #[inline]
    pub const fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    #[inline]
    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Position of this pixel in the color array: 0..63
    #[inline]
    pub const fn hash(self) -> u8 {
        hash(self)
    }
}

impl From<[u8; 4]> for Pixel {
    fn from(rgba: [u8; 4]) -> Self {
        Self::from_rgba(rgba)
    }
}

impl From<[u8; 3]> for Pixel {
    fn from(rgb: [u8; 3]) -> Self {
        Self::from_rgb(rgb)
    }
}

/// State shared by the encoder and decoder for a single pass.
///
/// Both sides must mutate this identically pixel by pixel for a stream to round-trip.
#[derive(Debug, Clone, Copy)]
pub struct QoifContext {
    pub prev: Pixel,
    pub arr: [Pixel; 64],
    /// Pending repeats of `prev`.
    ///
    /// The encoder counts up to [`QOIF_MAX_RUN`](consts::QOIF_MAX_RUN) before flushing, the
    /// decoder counts down the repeats it still has to yield.
    pub run: u8,
}

impl QoifContext {
    pub const fn new() -> Self {
        Self {
            prev: Pixel::START,
            arr: [Pixel::ZERO; 64],
            run: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Writes `pixel` to its color array slot and returns the slot index.
    #[inline]
    pub fn remember(&mut self, pixel: Pixel) -> u8 {
        let index = hash(pixel);
        self.arr[usize::from(index)] = pixel;
        index
    }
}

impl Default for QoifContext {
    fn default() -> Self {
        Self::new()
    }
}

pub mod consts {
    /// Re-emit a pixel from the color array.
    ///
    /// ```plain
    /// .- QOIF_OP_INDEX ---------.
    /// |         Byte[0]         |
    /// |  7  6  5  4  3  2  1  0 |
    /// |-------+-----------------|
    /// |  0  0 |     index       |
    /// `-------------------------`
    /// ```
    ///
    /// - 2-bit tag b00
    /// - 6-bit index into the color array: 0..63
    /// - A valid encoder must not issue 2 or more consecutive QOIF_OP_INDEX chunks to the same
    ///   index. QOIF_OP_RUN should be used instead.
    pub const QOIF_OP_INDEX: u8 = 0b0000_0000;

    /// Calculate a pixel based on a 2-bit difference from the previous pixel.
    ///
    /// ```plain
    /// .- QOIF_OP_DIFF ----------.
    /// |         Byte[0]         |
    /// |  7  6  5  4  3  2  1  0 |
    /// |-------+-----+-----+-----|
    /// |  0  1 |  dr |  dg |  db |
    /// `-------------------------`
    /// ```
    ///
    /// - 2-bit tag b01
    /// - 2-bit red channel difference from the previous pixel between -2..1, stored with a bias
    ///   of 2
    /// - 2-bit green channel difference from the previous pixel between -2..1, stored with a bias
    ///   of 2
    /// - 2-bit blue channel difference from the previous pixel between -2..1, stored with a bias
    ///   of 2
    ///
    /// Differences wrap around, so `255 + 1 == 0`. Alpha stays unchanged.
    pub const QOIF_OP_DIFF: u8 = 0b0100_0000;

    /// Calculate a pixel based on a 6-bit green-channel difference from the previous pixel, and
    /// differences to the green-channel difference for red and blue.
    ///
    ///  ```plain
    /// .- QOIF_OP_LUMA ------------------------------------.
    /// |         Byte[0]         |         Byte[1]         |
    /// |  7  6  5  4  3  2  1  0 |  7  6  5  4  3  2  1  0 |
    /// |-------+-----------------+-------------+-----------|
    /// |  1  0 |   green diff    |   dr - dg   |  db - dg  |
    /// `---------------------------------------------------`
    /// ```
    ///
    /// - 2-bit tag b10
    /// - 6-bit green channel difference from the previous pixel (`-32..31`), stored with a bias of
    ///   32
    /// - 4-bit red channel difference minus green channel difference (`-8..7`), stored with a bias
    ///   of 8
    /// - 4-bit blue channel difference minus green channel difference (`-8..7`), stored with a bias
    ///   of 8
    pub const QOIF_OP_LUMA: u8 = 0b1000_0000;

    /// Repeats the last pixel.
    ///
    /// ```plain
    /// .- QOIF_OP_RUN -----------.
    /// |         Byte[0]         |
    /// |  7  6  5  4  3  2  1  0 |
    /// |-------+-----------------|
    /// |  1  1 |       run       |
    /// `-------------------------`
    /// ```
    ///
    /// - 2-bit tag b11
    /// - 6-bit run-length repeating the previous pixel: 1..62
    /// - The run-length is stored with a bias of -1. Note that the run-lengths 63 and 64 (`b111110`
    ///   and `b111111`) are illegal as they are occupied by the QOIF_OP_RGB and QOIF_OP_RGBA tag.
    pub const QOIF_OP_RUN: u8 = 0b1100_0000;

    /// Emits a raw pixel, keeping the alpha of the previous pixel.
    ///
    /// ```plain
    /// .- QOIF_OP_RGB ---------------------------------------.
    /// |         Byte[0]         | Byte[1] | Byte[2] | Byte[3] |
    /// |  7  6  5  4  3  2  1  0 | 7 .. 0  | 7 .. 0  | 7 .. 0  |
    /// |-------------------------+---------+---------+---------|
    /// |  1  1  1  1  1  1  1  0 |   red   |  green  |  blue   |
    /// `-------------------------------------------------------`
    /// ```
    pub const QOIF_OP_RGB: u8 = 0b1111_1110;

    /// Emits a full raw pixel.
    ///
    /// ```plain
    /// .- QOIF_OP_RGBA ------------------------------------------------.
    /// |         Byte[0]         | Byte[1] | Byte[2] | Byte[3] | Byte[4] |
    /// |  7  6  5  4  3  2  1  0 | 7 .. 0  | 7 .. 0  | 7 .. 0  | 7 .. 0  |
    /// |-------------------------+---------+---------+---------+---------|
    /// |  1  1  1  1  1  1  1  1 |   red   |  green  |  blue   |  alpha  |
    /// `-----------------------------------------------------------------`
    /// ```
    pub const QOIF_OP_RGBA: u8 = 0b1111_1111;

    /// Selects the 2-bit tag of a byte.
    pub const QOIF_MASK_2: u8 = 0b1100_0000;

    pub const QOIF_MAGIC: [u8; 4] = *b"qoif";
    pub const QOIF_HEADER_SIZE: usize = 14;

    /// Marks the end of the stream.
    pub const QOIF_END_MARKER: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 1];

    /// Longest run a single QOIF_OP_RUN can describe.
    pub const QOIF_MAX_RUN: u8 = 62;

    /// Upper bound on `width * height` accepted by the codec.
    pub const QOIF_PIXELS_MAX: u64 = 400_000_000;
}
