use crate::consts::{QOIF_HEADER_SIZE, QOIF_MAGIC, QOIF_PIXELS_MAX};
use byteorder::{BigEndian, ByteOrder};
use snafu::{ensure, ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum DescriptorError {
    #[snafu(display("image dimensions must be non-zero, got {width}x{height}"))]
    ZeroDimension { width: u32, height: u32 },
    #[snafu(display("unsupported channel count {channels}, expected 3 or 4"))]
    InvalidChannels { channels: u8 },
    #[snafu(display("image of {width}x{height} pixels exceeds the supported pixel count"))]
    TooManyPixels { width: u32, height: u32 },
}

#[derive(Debug, Snafu)]
pub enum HeaderError {
    #[snafu(display("header truncated: got {len} of 14 bytes"))]
    Truncated { len: usize },
    #[snafu(display("invalid magic {magic:?}"))]
    InvalidMagic { magic: [u8; 4] },
    #[snafu(display("invalid colorspace byte {value}"))]
    InvalidColorspace { value: u8 },
    #[snafu(display("invalid image descriptor in header"))]
    Descriptor { source: DescriptorError },
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    Rgb = 3,
    Rgba = 4,
}

impl Channels {
    #[inline]
    pub const fn count(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Channels {
    type Error = DescriptorError;

    fn try_from(channels: u8) -> Result<Self, Self::Error> {
        match channels {
            3 => Ok(Channels::Rgb),
            4 => Ok(Channels::Rgba),
            _ => InvalidChannelsSnafu { channels }.fail(),
        }
    }
}

/// Informative tag describing how the channel values are meant to be interpreted.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Colorspace {
    /// sRGB color channels with linear alpha.
    #[default]
    Srgb = 0,
    /// All channels linear.
    Linear = 1,
}

impl TryFrom<u8> for Colorspace {
    type Error = HeaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Colorspace::Srgb),
            1 => Ok(Colorspace::Linear),
            _ => InvalidColorspaceSnafu { value }.fail(),
        }
    }
}

/// Dimensions and format tags of an image, fixed for one encode or decode pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    pub channels: Channels,
    pub colorspace: Colorspace,
}

impl ImageDescriptor {
    pub fn new(
        width: u32,
        height: u32,
        channels: Channels,
        colorspace: Colorspace,
    ) -> Result<Self, DescriptorError> {
        let descriptor = Self {
            width,
            height,
            channels,
            colorspace,
        };
        descriptor.validate()?;

        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let Self { width, height, .. } = *self;

        ensure!(width > 0 && height > 0, ZeroDimensionSnafu { width, height });
        ensure!(
            self.pixel_count() <= QOIF_PIXELS_MAX,
            TooManyPixelsSnafu { width, height }
        );

        Ok(())
    }

    #[inline]
    pub const fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Size of the raw pixel data with this descriptor's channel count.
    #[inline]
    pub const fn byte_count(&self) -> u64 {
        self.pixel_count() * self.channels.count() as u64
    }

    /// Worst-case size of an encoded stream: every pixel as QOIF_OP_RGB/QOIF_OP_RGBA, plus
    /// header and end marker.
    pub const fn max_encoded_len(&self) -> u64 {
        self.pixel_count() * (self.channels.count() as u64 + 1) + QOIF_HEADER_SIZE as u64 + 8
    }

    pub fn to_header_bytes(&self) -> [u8; QOIF_HEADER_SIZE] {
        let mut header = [0; QOIF_HEADER_SIZE];
        header[0..4].copy_from_slice(&QOIF_MAGIC);
        BigEndian::write_u32(&mut header[4..8], self.width);
        BigEndian::write_u32(&mut header[8..12], self.height);
        header[12] = self.channels.count();
        header[13] = self.colorspace as u8;
        header
    }

    /// Parses the 14-byte header at the start of `bytes`.
    pub fn from_header_bytes(bytes: &[u8]) -> Result<Self, HeaderError> {
        ensure!(
            bytes.len() >= QOIF_HEADER_SIZE,
            TruncatedSnafu { len: bytes.len() }
        );

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        ensure!(magic == QOIF_MAGIC, InvalidMagicSnafu { magic });

        let width = BigEndian::read_u32(&bytes[4..8]);
        let height = BigEndian::read_u32(&bytes[8..12]);
        let colorspace = Colorspace::try_from(bytes[13])?;
        let channels = Channels::try_from(bytes[12]).context(DescriptorSnafu)?;

        Self::new(width, height, channels, colorspace).context(DescriptorSnafu)
    }
}
