// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Container detection and decoding into [`PixelMap`]s.
//!
//! JPEG streams are decompressed with turbojpeg; PNG, GIF and BMP go
//! through the `image` crate. Whatever the container, decoding produces
//! unpremultiplied RGBA which then passes through the transforms requested
//! in [`DecodeOptions`], always in the same order:
//!
//! 1. crop to `desired_region`
//! 2. downsample by `sample_size`, then resize to `desired_size`
//! 3. rotate by `rotate` degrees clockwise
//! 4. convert to `desired_pixel_format`
//!
//! A failure at any step leaves no partial output behind.

use crate::{
    convert::{self, RgbaBuffer, Rotation},
    error::{Error, Result},
    format::{AlphaType, ColorSpace, ImageInfo, PixelFormat, Region, Size},
    pixel_map::{self, PixelMap},
};
use image::{codecs::gif::GifDecoder, AnimationDecoder, ImageFormat as CodecFormat};
use std::io::Cursor;
use tracing::{debug, instrument};

/// MIME types that can be decoded.
pub const DECODE_FORMATS: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/bmp"];

/// Encoded container, identified from its leading signature bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Container {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl Container {
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xff, 0xd8, 0xff]) {
            Some(Container::Jpeg)
        } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Container::Png)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(Container::Gif)
        } else if data.starts_with(b"BM") {
            Some(Container::Bmp)
        } else {
            None
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Container::Jpeg => "image/jpeg",
            Container::Png => "image/png",
            Container::Gif => "image/gif",
            Container::Bmp => "image/bmp",
        }
    }

    fn codec(self) -> CodecFormat {
        match self {
            Container::Jpeg => CodecFormat::Jpeg,
            Container::Png => CodecFormat::Png,
            Container::Gif => CodecFormat::Gif,
            Container::Bmp => CodecFormat::Bmp,
        }
    }

    pub(crate) fn detect(data: &[u8]) -> Result<Self> {
        Container::sniff(data).ok_or_else(|| {
            Error::UnsupportedFormat(format!(
                "unrecognized image signature {:02x?}",
                &data[..data.len().min(8)]
            ))
        })
    }
}

/// Options controlling how an image is decoded.
#[derive(Clone, Debug)]
pub struct DecodeOptions {
    /// Frame to decode from multi-frame containers.
    pub index: u32,
    /// Integer downsampling factor, at least 1.
    pub sample_size: u32,
    /// Clockwise rotation in degrees, 0 to 360.
    pub rotate: f32,
    pub editable: bool,
    /// Output size; `(0, 0)` keeps the decoded size and a single zero side
    /// follows the aspect ratio.
    pub desired_size: Size,
    /// Crop applied to the decoded image before any other transform.
    pub desired_region: Option<Region>,
    /// Output format, `Unknown` selects RGBA_8888.
    pub desired_pixel_format: PixelFormat,
    /// Pixel map whose memory backs the decoded pixels. Its memory is
    /// transferred on success and all of its handles become unusable.
    pub reuse: Option<PixelMap>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            index: 0,
            sample_size: 1,
            rotate: 0.0,
            editable: false,
            desired_size: Size::default(),
            desired_region: None,
            desired_pixel_format: PixelFormat::Unknown,
            reuse: None,
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(err) => Error::UnsupportedFormat(err.to_string()),
            image::ImageError::Limits(err) => Error::InvalidArgument(err.to_string()),
            other => Error::CorruptData(other.to_string()),
        }
    }
}

/// Reads the image dimensions without decoding pixels.
pub(crate) fn dimensions(data: &[u8], container: Container) -> Result<Size> {
    let (width, height) = match container {
        Container::Jpeg => {
            let header = turbojpeg::read_header(data)?;
            (header.width as u32, header.height as u32)
        }
        other => image::ImageReader::with_format(Cursor::new(data), other.codec())
            .into_dimensions()?,
    };
    Ok(Size::new(width, height))
}

/// Number of frames in the container.
///
/// GIF frames are counted from their descriptors; pixel data is skipped,
/// never expanded or composited.
pub(crate) fn frame_count(data: &[u8], container: Container) -> Result<u32> {
    match container {
        Container::Gif => {
            let mut options = gif::DecodeOptions::new();
            options.set_color_output(gif::ColorOutput::Indexed);
            let mut decoder = options.read_info(Cursor::new(data))?;
            let mut count = 0;
            while decoder.next_frame_info()?.is_some() {
                count += 1;
            }
            Ok(count)
        }
        _ => Ok(1),
    }
}

/// Info describing the encoded image at `index`, read from headers only.
pub(crate) fn source_info(data: &[u8], container: Container) -> Result<ImageInfo> {
    Ok(ImageInfo {
        size: dimensions(data, container)?,
        pixel_format: PixelFormat::Rgba8888,
        color_space: ColorSpace::Srgb,
        alpha_type: match container {
            Container::Jpeg | Container::Bmp => AlphaType::Opaque,
            Container::Png | Container::Gif => AlphaType::Unpremul,
        },
    })
}

fn out_of_range(index: u32, count: u32) -> Error {
    Error::OutOfRange(format!("frame index {index} but image has {count} frames"))
}

/// Decodes one frame into native RGBA samples.
fn decode_frame(data: &[u8], container: Container, index: u32) -> Result<RgbaBuffer> {
    match container {
        Container::Gif => {
            let frames = GifDecoder::new(Cursor::new(data))?.into_frames();
            let mut seen = 0;
            for frame in frames {
                let frame = frame?;
                if seen == index {
                    let buffer = frame.into_buffer();
                    let (width, height) = buffer.dimensions();
                    return RgbaBuffer::from_raw(width, height, buffer.into_raw());
                }
                seen += 1;
            }
            Err(out_of_range(index, seen))
        }
        single => {
            if index > 0 {
                return Err(out_of_range(index, 1));
            }
            match single {
                Container::Jpeg => decode_jpeg(data),
                other => {
                    let decoded =
                        image::load_from_memory_with_format(data, other.codec())?.to_rgba8();
                    let (width, height) = decoded.dimensions();
                    RgbaBuffer::from_raw(width, height, decoded.into_raw())
                }
            }
        }
    }
}

fn decode_jpeg(data: &[u8]) -> Result<RgbaBuffer> {
    let img = turbojpeg::decompress(data, turbojpeg::PixelFormat::RGBA)?;
    let row = img.width * 4;
    let pixels = if img.pitch == row {
        img.pixels
    } else {
        img.pixels
            .chunks(img.pitch)
            .take(img.height)
            .flat_map(|line| line[..row].iter().copied())
            .collect()
    };
    RgbaBuffer::from_raw(img.width as u32, img.height as u32, pixels)
}

fn target_size(desired: Size, current: Size) -> Size {
    let scale = |side: u32, num: u32, den: u32| {
        ((side as u64 * num as u64 + den as u64 / 2) / den as u64).max(1) as u32
    };
    match (desired.width, desired.height) {
        (0, 0) => current,
        (0, h) => Size::new(scale(h, current.width, current.height), h),
        (w, 0) => Size::new(w, scale(w, current.height, current.width)),
        _ => desired,
    }
}

/// Decodes `data` and applies the transforms requested in `options`.
///
/// # Errors
///
/// - [`Error::UnsupportedFormat`] if the container is not recognized
/// - [`Error::CorruptData`] if the stream cannot be parsed
/// - [`Error::OutOfRange`] if the frame index or crop region is outside
///   the image
/// - [`Error::InvalidArgument`] for a zero sample size or a rotation
///   outside 0 to 360 degrees
/// - [`Error::BufferTooSmall`] if the reused pixel map cannot hold the
///   output, in which case it is left untouched
#[instrument(skip_all, fields(len = data.len(), index = options.index))]
pub fn decode(data: &[u8], options: DecodeOptions) -> Result<PixelMap> {
    if options.sample_size == 0 {
        return Err(Error::InvalidArgument("sample size must be at least 1".into()));
    }
    let rotation = Rotation::from_degrees(options.rotate)?;
    let container = Container::detect(data)?;

    let mut rgba = decode_frame(data, container, options.index)?;
    debug!("decoded {} {}", container.mime(), rgba.size());

    if let Some(region) = &options.desired_region {
        rgba = convert::crop(&rgba, region)?;
    }
    rgba = convert::sample(&rgba, options.sample_size)?;
    let size = target_size(options.desired_size, rgba.size());
    // the RGBA intermediates are bounded like any pixel map
    pixel_map::layout(size, PixelFormat::Rgba8888)?;
    pixel_map::layout(convert::rotated_size(size, rotation), PixelFormat::Rgba8888)?;
    rgba = convert::resize(&rgba, size)?;
    rgba = convert::rotate(&rgba, rotation)?;

    let format = options.desired_pixel_format.or_default();
    let (_, required) = pixel_map::layout(rgba.size(), format)?;
    let reuse = match &options.reuse {
        Some(map) => Some(map.take_storage(required)?),
        None => None,
    };
    PixelMap::from_rgba(
        &rgba,
        format,
        format.natural_alpha(),
        options.editable,
        reuse,
    )
}
