use argh::FromArgs;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use logging::{init_logging, LogLevel};
use qoif::{
    consts::QOIF_MAX_RUN,
    io::{QoifRead, QoifWrite, StreamReader, StreamWriter},
    Channels, Colorspace, DecodeOptions, ImageDescriptor, Pixel,
};
use std::{fs::File, io::BufReader, str::FromStr};
use tracing::debug;

mod logging;

/// QOIF cli encoder and decoder.
#[derive(FromArgs)]
struct Cli {
    /// log level (error, warn, info, debug, trace), overridden by RUST_LOG
    #[argh(option, default = "LogLevel::Warn")]
    log_level: LogLevel,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Encode(Encode),
    Decode(Decode),
    Info(Info),
}

/// Encodes an image as QOIF.
#[derive(FromArgs)]
#[argh(subcommand, name = "encode")]
struct Encode {
    /// input format, optional (png, jpg, bmp, webp)
    #[argh(option)]
    format: Option<Format>,

    /// colorspace tag written to the header (srgb, linear)
    #[argh(option, default = "ColorspaceArg::Srgb")]
    colorspace: ColorspaceArg,

    /// always encode 4 channels, even if the input has no alpha
    #[argh(switch)]
    force_rgba: bool,

    /// the input file. May be a PNG, JPG, BMP, WebP or TIFF.
    #[argh(positional)]
    input: String,
    /// the output file
    #[argh(positional)]
    output: String,
}

/// Decodes a QOIF image.
#[derive(FromArgs)]
#[argh(subcommand, name = "decode")]
struct Decode {
    /// output format (png, jpg, bmp)
    #[argh(option)]
    format: Format,

    /// fail if the stream doesn't end with a valid end marker
    #[argh(switch)]
    strict: bool,

    /// the input file
    #[argh(positional)]
    input: String,
    /// the output file
    #[argh(positional)]
    output: String,
}

/// Prints the header of a QOIF image.
#[derive(FromArgs)]
#[argh(subcommand, name = "info")]
struct Info {
    /// the input file
    #[argh(positional)]
    input: String,
}

#[derive(Debug, Clone, Copy)]
enum Format {
    Png,
    Jpg,
    Bmp,
    Webp,
}

impl Format {
    fn image_format(self) -> ImageFormat {
        match self {
            Format::Png => ImageFormat::Png,
            Format::Jpg => ImageFormat::Jpeg,
            Format::Bmp => ImageFormat::Bmp,
            Format::Webp => ImageFormat::WebP,
        }
    }
}

impl FromStr for Format {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        #[rustfmt::skip]
        let Some(format) = s.eq_ignore_ascii_case("png").then_some(Format::Png)
               .or_else(|| s.eq_ignore_ascii_case("jpg").then_some(Format::Jpg))
               .or_else(|| s.eq_ignore_ascii_case("bmp").then_some(Format::Bmp))
               .or_else(|| s.eq_ignore_ascii_case("webp").then_some(Format::Webp))
        else { return Err("invalid string"); };

        Ok(format)
    }
}

#[derive(Debug, Clone, Copy)]
enum ColorspaceArg {
    Srgb,
    Linear,
}

impl FromStr for ColorspaceArg {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("srgb") {
            Ok(ColorspaceArg::Srgb)
        } else if s.eq_ignore_ascii_case("linear") {
            Ok(ColorspaceArg::Linear)
        } else {
            Err("invalid colorspace")
        }
    }
}

impl From<ColorspaceArg> for Colorspace {
    fn from(arg: ColorspaceArg) -> Self {
        match arg {
            ColorspaceArg::Srgb => Colorspace::Srgb,
            ColorspaceArg::Linear => Colorspace::Linear,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Cli { log_level, command } = argh::from_env();
    init_logging(log_level);

    match command {
        Command::Encode(options) => encode(options),
        Command::Decode(options) => decode(options),
        Command::Info(options) => info(options),
    }
}

fn encode(options: Encode) -> Result<(), Box<dyn std::error::Error>> {
    let Encode {
        format,
        colorspace,
        force_rgba,
        input,
        output,
    } = options;

    let image = match format {
        Some(format) => {
            image::io::Reader::with_format(BufReader::new(File::open(&input)?), format.image_format())
                .decode()?
        }
        None => image::io::Reader::open(&input)?
            .with_guessed_format()?
            .decode()?,
    };
    debug!(color = ?image.color(), "loaded `{input}`");

    let channels = if force_rgba || image.color().has_alpha() {
        Channels::Rgba
    } else {
        Channels::Rgb
    };
    let descriptor = ImageDescriptor::new(image.width(), image.height(), channels, colorspace.into())?;
    let ImageDescriptor { width, height, .. } = descriptor;

    println!("Encoding {width}x{height} image with {} channels", channels.count());

    let mut w = StreamWriter::new(File::create(&output)?);
    match channels {
        Channels::Rgba => qoif::encode(
            image.into_rgba8().pixels().map(|p| Pixel::from_rgba(p.0)),
            &descriptor,
            &mut w,
        )?,
        Channels::Rgb => qoif::encode(
            image.into_rgb8().pixels().map(|p| Pixel::from_rgb(p.0)),
            &descriptor,
            &mut w,
        )?,
    }

    println!("Written {} bytes to `{output}`", w.bytes_written());

    Ok(())
}

fn decode(options: Decode) -> Result<(), Box<dyn std::error::Error>> {
    let Decode {
        format,
        strict,
        input,
        output,
    } = options;

    if let Format::Webp = format {
        return Err("webp output is not supported".into());
    }

    println!("Decoding `{input}`");

    let file = File::open(&input)?;
    let size = file.metadata()?.len();
    let reader = StreamReader::new(file);
    let (descriptor, mut pixels) = qoif::decode_with_options(reader, DecodeOptions { strict })?;
    let ImageDescriptor {
        width,
        height,
        channels,
        ..
    } = descriptor;

    // the header is untrusted; one input byte describes at most 62 pixels
    let capacity = raw_capacity(&descriptor, size);
    let mut raw = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));
    for pixel in pixels.by_ref() {
        let pixel = pixel?;
        match channels {
            Channels::Rgba => raw.extend_from_slice(&pixel.to_rgba()),
            Channels::Rgb => raw.extend_from_slice(&pixel.to_rgb()),
        }
    }
    let reader = pixels.finish()?;
    debug!(bytes = reader.bytes_read(), "read `{input}`");

    let image = match channels {
        Channels::Rgba => DynamicImage::ImageRgba8(
            RgbaImage::from_vec(width, height, raw).ok_or("failed to create image")?,
        ),
        Channels::Rgb => DynamicImage::ImageRgb8(
            RgbImage::from_vec(width, height, raw).ok_or("failed to create image")?,
        ),
    };

    // JPEG has no alpha channel
    let image = match format {
        Format::Jpg => DynamicImage::ImageRgb8(image.into_rgb8()),
        _ => image,
    };
    image.save_with_format(&output, format.image_format())?;

    println!("Written {width}x{height} image to `{output}`");

    Ok(())
}

fn raw_capacity(descriptor: &ImageDescriptor, encoded_len: u64) -> u64 {
    let per_pixel = u64::from(descriptor.channels.count());
    descriptor
        .byte_count()
        .min(encoded_len.saturating_mul(u64::from(QOIF_MAX_RUN) * per_pixel))
}

fn info(options: Info) -> Result<(), Box<dyn std::error::Error>> {
    let Info { input } = options;

    let file = File::open(&input)?;
    let size = file.metadata()?.len();
    let (descriptor, _) = qoif::decode(StreamReader::new(file))?;
    let ImageDescriptor {
        width,
        height,
        channels,
        colorspace,
    } = descriptor;

    let raw_size = descriptor.byte_count();
    println!("`{input}`: {width}x{height}, {} channels, {colorspace:?}", channels.count());
    println!(
        "{size} bytes encoded, {raw_size} bytes raw ({:.1}%)",
        size as f64 * 100.0 / raw_size as f64
    );

    Ok(())
}
