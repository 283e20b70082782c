// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel, frame and component formats plus the small geometry types shared
//! by pixel maps, decoders and receivers.
//!
//! The raw integer values match the platform API so handles can be
//! described by plain numbers at FFI or IPC boundaries, but inside the crate
//! every format is a closed enum.

use crate::error::{Error, Result};
use core::fmt;

/// Layout of a pixel in a [`PixelMap`](crate::pixel_map::PixelMap).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Unknown,
    /// 32-bit, bytes ordered A, R, G, B
    Argb8888,
    /// 16-bit little endian, 5 bits red, 6 bits green, 5 bits blue
    Rgb565,
    /// 32-bit, bytes ordered R, G, B, A
    Rgba8888,
    /// 32-bit, bytes ordered B, G, R, A
    Bgra8888,
    /// 24-bit, bytes ordered R, G, B
    Rgb888,
    /// 8-bit alpha only
    Alpha8,
}

impl PixelFormat {
    /// Number of bytes used by a single pixel, zero for `Unknown`.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Unknown => 0,
            PixelFormat::Argb8888 | PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => 4,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Alpha8 => 1,
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(
            self,
            PixelFormat::Argb8888
                | PixelFormat::Rgba8888
                | PixelFormat::Bgra8888
                | PixelFormat::Alpha8
        )
    }

    pub const fn raw(self) -> i32 {
        match self {
            PixelFormat::Unknown => 0,
            PixelFormat::Argb8888 => 1,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgba8888 => 3,
            PixelFormat::Bgra8888 => 4,
            PixelFormat::Rgb888 => 5,
            PixelFormat::Alpha8 => 6,
        }
    }

    /// The format used when a caller leaves the format as `Unknown`.
    pub(crate) fn or_default(self) -> Self {
        match self {
            PixelFormat::Unknown => PixelFormat::Rgba8888,
            other => other,
        }
    }

    /// Alpha type a freshly converted buffer of this format carries.
    pub(crate) fn natural_alpha(self) -> AlphaType {
        if self.has_alpha() {
            AlphaType::Unpremul
        } else {
            AlphaType::Opaque
        }
    }
}

impl TryFrom<i32> for PixelFormat {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        Ok(match value {
            0 => PixelFormat::Unknown,
            1 => PixelFormat::Argb8888,
            2 => PixelFormat::Rgb565,
            3 => PixelFormat::Rgba8888,
            4 => PixelFormat::Bgra8888,
            5 => PixelFormat::Rgb888,
            6 => PixelFormat::Alpha8,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unknown pixel format {other}"
                )))
            }
        })
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PixelFormat::Unknown => "UNKNOWN",
            PixelFormat::Argb8888 => "ARGB_8888",
            PixelFormat::Rgb565 => "RGB_565",
            PixelFormat::Rgba8888 => "RGBA_8888",
            PixelFormat::Bgra8888 => "BGRA_8888",
            PixelFormat::Rgb888 => "RGB_888",
            PixelFormat::Alpha8 => "ALPHA_8",
        };
        f.write_str(name)
    }
}

/// Alpha interpretation of the color channels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum AlphaType {
    #[default]
    Unknown,
    Opaque,
    Premul,
    Unpremul,
}

impl TryFrom<i32> for AlphaType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        Ok(match value {
            0 => AlphaType::Unknown,
            1 => AlphaType::Opaque,
            2 => AlphaType::Premul,
            3 => AlphaType::Unpremul,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unknown alpha type {other}"
                )))
            }
        })
    }
}

/// Color space tag carried as metadata, pixels are never transformed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    #[default]
    Unknown,
    Srgb,
    LinearSrgb,
    DisplayP3,
}

/// Frame formats delivered to an [`ImageReceiver`](crate::receiver::ImageReceiver).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// 4:2:2 semi-planar: a full Y plane followed by interleaved Cb/Cr.
    YCbCr422Sp,
    /// A complete JPEG bitstream per frame.
    Jpeg,
}

impl ImageFormat {
    pub const fn raw(self) -> i32 {
        match self {
            ImageFormat::YCbCr422Sp => 1000,
            ImageFormat::Jpeg => 2000,
        }
    }
}

impl TryFrom<i32> for ImageFormat {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            1000 => Ok(ImageFormat::YCbCr422Sp),
            2000 => Ok(ImageFormat::Jpeg),
            other => Err(Error::InvalidArgument(format!(
                "unknown image format {other}"
            ))),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImageFormat::YCbCr422Sp => f.write_str("YCBCR_422_SP"),
            ImageFormat::Jpeg => f.write_str("JPEG"),
        }
    }
}

/// Planes that can be requested from a received image.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    YuvY,
    YuvU,
    YuvV,
    Jpeg,
}

impl TryFrom<i32> for ComponentType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            1 => Ok(ComponentType::YuvY),
            2 => Ok(ComponentType::YuvU),
            3 => Ok(ComponentType::YuvV),
            4 => Ok(ComponentType::Jpeg),
            other => Err(Error::InvalidArgument(format!(
                "unknown component type {other}"
            ))),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Size { width, height }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rectangle specification for crop and partial pixel I/O.
///
/// Offsets are signed so that a negative origin is reported as out of range
/// instead of wrapping.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Region {
    /// X coordinate of top-left corner
    pub x: i32,
    /// Y coordinate of top-left corner
    pub y: i32,
    /// Width of the rectangle in pixels
    pub width: u32,
    /// Height of the rectangle in pixels
    pub height: u32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Region {
            x,
            y,
            width,
            height,
        }
    }

    /// The region covering an entire image of `size`.
    pub const fn full(size: Size) -> Self {
        Region::new(0, 0, size.width, size.height)
    }

    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Checks that the region is non-empty and lies entirely within `bounds`.
    pub(crate) fn check_within(&self, bounds: Size) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidArgument(format!("empty region {self}")));
        }
        let right = self.x as i64 + self.width as i64;
        let bottom = self.y as i64 + self.height as i64;
        if self.x < 0 || self.y < 0 || right > bounds.width as i64 || bottom > bounds.height as i64
        {
            return Err(Error::OutOfRange(format!(
                "region {self} exceeds image {bounds}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Caller side buffer for partial pixel I/O.
///
/// `pixels[offset..]` holds `region.height` rows of
/// `region.width * bytes_per_pixel` bytes, each row starting `stride` bytes
/// after the previous one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionArea {
    pub pixels: Vec<u8>,
    pub offset: usize,
    pub stride: usize,
    pub region: Region,
}

impl PositionArea {
    /// Allocates a tightly packed area for `region` in `format`.
    pub fn new(region: Region, format: PixelFormat) -> Self {
        let stride = region.width as usize * format.bytes_per_pixel();
        PositionArea {
            pixels: vec![0; stride * region.height as usize],
            offset: 0,
            stride,
            region,
        }
    }
}

/// Information describing a decoded or decodable image.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct ImageInfo {
    pub size: Size,
    pub pixel_format: PixelFormat,
    pub color_space: ColorSpace,
    pub alpha_type: AlphaType,
}

/// Options used to create a blank pixel map or import colors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct InitializationOptions {
    pub size: Size,
    pub pixel_format: PixelFormat,
    pub alpha_type: AlphaType,
    pub editable: bool,
}

impl InitializationOptions {
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        InitializationOptions {
            size: Size::new(width, height),
            pixel_format,
            ..Default::default()
        }
    }

    pub fn editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    pub fn alpha_type(mut self, alpha_type: AlphaType) -> Self {
        self.alpha_type = alpha_type;
        self
    }
}
