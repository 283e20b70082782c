// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Encoding of pixel maps and image sources into JPEG or PNG.

use crate::{
    completion::Completion,
    convert::RgbaBuffer,
    decoder::DecodeOptions,
    error::{Error, Result},
    format::PixelFormat,
    image_source::ImageSource,
    pixel_map::PixelMap,
};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, instrument};

/// MIME types accepted by [`ImagePacker::pack`].
pub const PACK_FORMATS: [&str; 2] = ["image/jpeg", "image/png"];

/// Quality used by [`PackingOption::default`].
pub const DEFAULT_QUALITY: i32 = 100;

/// Target format and quality of a pack operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackingOption {
    /// Output MIME type, `image/jpeg` or `image/png`.
    pub format: String,
    /// 0 to 100. Drives JPEG compression, validated but unused for PNG.
    pub quality: i32,
}

impl PackingOption {
    pub fn new(format: impl Into<String>, quality: i32) -> Self {
        PackingOption {
            format: format.into(),
            quality,
        }
    }
}

impl Default for PackingOption {
    fn default() -> Self {
        PackingOption::new("image/jpeg", DEFAULT_QUALITY)
    }
}

/// What to pack. Image sources are decoded with default options first.
#[derive(Clone, Debug)]
pub enum PackSource {
    PixelMap(PixelMap),
    ImageSource(ImageSource),
}

impl From<PixelMap> for PackSource {
    fn from(map: PixelMap) -> Self {
        PackSource::PixelMap(map)
    }
}

impl From<&PixelMap> for PackSource {
    fn from(map: &PixelMap) -> Self {
        PackSource::PixelMap(map.clone())
    }
}

impl From<ImageSource> for PackSource {
    fn from(source: ImageSource) -> Self {
        PackSource::ImageSource(source)
    }
}

impl From<&ImageSource> for PackSource {
    fn from(source: &ImageSource) -> Self {
        PackSource::ImageSource(source.clone())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Target {
    Jpeg,
    Png,
}

impl Target {
    fn parse(mime: &str) -> Result<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Ok(Target::Jpeg),
            "image/png" => Ok(Target::Png),
            _ => Err(Error::UnsupportedFormat(format!("cannot pack {mime:?}"))),
        }
    }
}

/// Pixels extracted from the source, ready for a codec.
struct Packable {
    rgba: RgbaBuffer,
    format: PixelFormat,
}

impl Packable {
    fn load(source: &PackSource) -> Result<Self> {
        let map = match source {
            PackSource::PixelMap(map) => map.clone(),
            PackSource::ImageSource(source) => source.create_pixel_map(DecodeOptions::default())?,
        };
        Ok(Packable {
            rgba: map.to_rgba()?,
            format: map.pixel_format()?,
        })
    }

    /// Single channel samples, the alpha plane of an `Alpha8` map.
    fn alpha_plane(&self) -> Vec<u8> {
        self.rgba.data.chunks_exact(4).map(|px| px[3]).collect()
    }

    fn rgb(&self) -> Vec<u8> {
        self.rgba
            .data
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    }
}

fn encode_jpeg(img: &Packable, quality: i32) -> Result<Vec<u8>> {
    let (width, height) = (img.rgba.width as usize, img.rgba.height as usize);
    // libjpeg refuses a quality of zero
    let quality = quality.max(1);
    let buf = if img.format == PixelFormat::Alpha8 {
        let gray = img.alpha_plane();
        let image = turbojpeg::Image {
            pixels: gray.as_slice(),
            width,
            pitch: width,
            height,
            format: turbojpeg::PixelFormat::GRAY,
        };
        turbojpeg::compress(image, quality, turbojpeg::Subsamp::Gray)?
    } else {
        let image = turbojpeg::Image {
            pixels: img.rgba.data.as_slice(),
            width,
            pitch: width * 4,
            height,
            format: turbojpeg::PixelFormat::RGBA,
        };
        turbojpeg::compress(image, quality, turbojpeg::Subsamp::Sub2x2)?
    };
    Ok(buf.to_vec())
}

fn encode_png(img: &Packable) -> Result<Vec<u8>> {
    let (width, height) = (img.rgba.width, img.rgba.height);
    let (pixels, color): (Vec<u8>, _) = match img.format {
        PixelFormat::Alpha8 => (
            img.alpha_plane()
                .into_iter()
                .flat_map(|a| [0, a])
                .collect(),
            ExtendedColorType::La8,
        ),
        format if !format.has_alpha() => (img.rgb(), ExtendedColorType::Rgb8),
        _ => (img.rgba.data.clone(), ExtendedColorType::Rgba8),
    };
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(&pixels, width, height, color)?;
    Ok(out)
}

/// Encodes pixel maps and image sources.
///
/// # Example
///
/// ```no_run
/// use edgefirst_image::{create_image_packer, InitializationOptions, PackingOption, PixelFormat, PixelMap};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let map = PixelMap::new(InitializationOptions::new(640, 480, PixelFormat::Rgba8888))?;
/// let packer = create_image_packer();
/// let jpeg = packer.pack(&map, &PackingOption::new("image/jpeg", 90))?;
/// println!("Compressed to {} bytes", jpeg.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct ImagePacker {
    released: Arc<AtomicBool>,
}

impl ImagePacker {
    pub fn new() -> Self {
        ImagePacker::default()
    }

    pub fn supported_formats(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(PACK_FORMATS.iter().map(|s| s.to_string()).collect())
    }

    fn check(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(Error::AlreadyReleased);
        }
        Ok(())
    }

    /// Encodes `source` into the container selected by `option`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if quality is outside 0 to 100
    /// - [`Error::UnsupportedFormat`] if the MIME type is not one of
    ///   [`PACK_FORMATS`]
    /// - any error raised while decoding an [`ImageSource`] or reading the
    ///   [`PixelMap`]
    #[instrument(skip_all, fields(format = %option.format, quality = option.quality))]
    pub fn pack(&self, source: impl Into<PackSource>, option: &PackingOption) -> Result<Vec<u8>> {
        self.check()?;
        if !(0..=100).contains(&option.quality) {
            return Err(Error::InvalidArgument(format!(
                "quality {} is outside 0..=100",
                option.quality
            )));
        }
        let target = Target::parse(&option.format)?;
        let img = Packable::load(&source.into())?;
        let out = match target {
            Target::Jpeg => encode_jpeg(&img, option.quality)?,
            Target::Png => encode_png(&img)?,
        };
        debug!(
            "packed {}x{} {} into {} bytes",
            img.rgba.width,
            img.rgba.height,
            img.format,
            out.len()
        );
        Ok(out)
    }

    pub fn pack_async(
        &self,
        source: impl Into<PackSource>,
        option: PackingOption,
    ) -> Completion<Vec<u8>> {
        let (packer, source) = (self.clone(), source.into());
        Completion::blocking(move || packer.pack(source, &option))
    }

    /// A second release fails with [`Error::AlreadyReleased`].
    pub fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyReleased);
        }
        debug!("image packer released");
        Ok(())
    }

    pub fn release_async(&self) -> Completion<()> {
        let packer = self.clone();
        Completion::blocking(move || packer.release())
    }
}
