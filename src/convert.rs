// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Software pixel conversion, cropping, scaling and rotation.
//!
//! Every transform operates on [`RgbaBuffer`], a tightly packed
//! unpremultiplied RGBA_8888 image. Pixel maps in other layouts are unpacked
//! into it with [`to_rgba`] and packed back with [`from_rgba`], so each
//! transform is written once regardless of the source or target format.
//!
//! Scaling is nearest-neighbour throughout which keeps decode results
//! deterministic and bit-exact across platforms.

use crate::{
    error::{Error, Result},
    format::{AlphaType, PixelFormat, Region, Size},
    pixel_map::MAX_PIXEL_MAP_BYTES,
};

/// Tightly packed, unpremultiplied RGBA_8888 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbaBuffer {
    /// Zeroed buffer, limited to [`MAX_PIXEL_MAP_BYTES`] like any pixel map.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .filter(|len| *len <= MAX_PIXEL_MAP_BYTES)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "{width}x{height} RGBA exceeds the {MAX_PIXEL_MAP_BYTES} byte limit"
                ))
            })?;
        Ok(RgbaBuffer {
            width,
            height,
            data: vec![0; len],
        })
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4));
        if expected != Some(data.len()) {
            return Err(Error::CorruptData(format!(
                "expected {width}x{height} RGBA bytes, found {}",
                data.len()
            )));
        }
        Ok(RgbaBuffer {
            width,
            height,
            data,
        })
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline]
    fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    #[inline]
    fn put(&mut self, x: u32, y: u32, px: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&px);
    }
}

/// Rotation angles with dedicated exact paths; anything else is resampled.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Rotation {
    /// No rotation (0 degrees)
    Rotation0,
    /// Rotate 90 degrees clockwise
    Rotation90,
    /// Rotate 180 degrees
    Rotation180,
    /// Rotate 270 degrees clockwise (90 degrees counter-clockwise)
    Rotation270,
    /// Any other clockwise angle in degrees
    Degrees(f64),
}

impl Rotation {
    /// Accepts clockwise angles between 0 and 360 inclusive.
    pub fn from_degrees(degrees: f32) -> Result<Self> {
        if !degrees.is_finite() || !(0.0..=360.0).contains(&degrees) {
            return Err(Error::InvalidArgument(format!(
                "rotation {degrees} is outside 0..=360 degrees"
            )));
        }
        Ok(match degrees {
            d if d == 0.0 || d == 360.0 => Rotation::Rotation0,
            d if d == 90.0 => Rotation::Rotation90,
            d if d == 180.0 => Rotation::Rotation180,
            d if d == 270.0 => Rotation::Rotation270,
            d => Rotation::Degrees(d as f64),
        })
    }
}

#[inline]
pub(crate) fn premul255(component: u8, alpha: u8) -> u8 {
    let product = component as u32 * alpha as u32 + 0x80;
    ((product + (product >> 8)) >> 8) as u8
}

#[inline]
pub(crate) fn unpremul255(component: u8, alpha: u8) -> u8 {
    if alpha == 0 {
        return 0;
    }
    let value = (component as u32 * 255 + alpha as u32 / 2) / alpha as u32;
    value.min(255) as u8
}

#[inline]
fn expand5(v: u16) -> u8 {
    let v = (v & 0x1f) as u8;
    (v << 3) | (v >> 2)
}

#[inline]
fn expand6(v: u16) -> u8 {
    let v = (v & 0x3f) as u8;
    (v << 2) | (v >> 4)
}

/// Unpacks one pixel of `format` into unpremultiplied RGBA.
#[inline]
pub(crate) fn unpack(format: PixelFormat, px: &[u8]) -> [u8; 4] {
    match format {
        PixelFormat::Argb8888 => [px[1], px[2], px[3], px[0]],
        PixelFormat::Rgba8888 => [px[0], px[1], px[2], px[3]],
        PixelFormat::Bgra8888 => [px[2], px[1], px[0], px[3]],
        PixelFormat::Rgb888 => [px[0], px[1], px[2], 0xff],
        PixelFormat::Rgb565 => {
            let v = u16::from_le_bytes([px[0], px[1]]);
            [expand5(v >> 11), expand6(v >> 5), expand5(v), 0xff]
        }
        PixelFormat::Alpha8 => [0, 0, 0, px[0]],
        PixelFormat::Unknown => [0, 0, 0, 0],
    }
}

/// Packs one RGBA pixel into `out`, which holds exactly one `format` pixel.
#[inline]
pub(crate) fn pack(format: PixelFormat, rgba: [u8; 4], out: &mut [u8]) {
    let [r, g, b, a] = rgba;
    match format {
        PixelFormat::Argb8888 => out.copy_from_slice(&[a, r, g, b]),
        PixelFormat::Rgba8888 => out.copy_from_slice(&[r, g, b, a]),
        PixelFormat::Bgra8888 => out.copy_from_slice(&[b, g, r, a]),
        PixelFormat::Rgb888 => out.copy_from_slice(&[r, g, b]),
        PixelFormat::Rgb565 => {
            let v = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
            out.copy_from_slice(&v.to_le_bytes());
        }
        PixelFormat::Alpha8 => out[0] = a,
        PixelFormat::Unknown => {}
    }
}

/// Converts a strided buffer of `format` into unpremultiplied RGBA.
pub fn to_rgba(
    src: &[u8],
    stride: usize,
    size: Size,
    format: PixelFormat,
    alpha: AlphaType,
) -> Result<RgbaBuffer> {
    let bpp = format.bytes_per_pixel();
    if bpp == 0 {
        return Err(Error::UnsupportedFormat(format!("cannot read {format} pixels")));
    }
    let row = size.width as usize * bpp;
    let required = stride
        .checked_mul(size.height.saturating_sub(1) as usize)
        .and_then(|len| len.checked_add(row))
        .unwrap_or(usize::MAX);
    if stride < row || src.len() < required {
        return Err(Error::BufferTooSmall {
            required,
            available: src.len(),
        });
    }

    let mut out = RgbaBuffer::new(size.width, size.height)?;
    for (y, dst_row) in out
        .data
        .chunks_exact_mut(size.width as usize * 4)
        .enumerate()
    {
        let src_row = &src[y * stride..y * stride + row];
        for (px, dst) in src_row.chunks_exact(bpp).zip(dst_row.chunks_exact_mut(4)) {
            let mut rgba = unpack(format, px);
            if alpha == AlphaType::Premul && format.has_alpha() {
                rgba = [
                    unpremul255(rgba[0], rgba[3]),
                    unpremul255(rgba[1], rgba[3]),
                    unpremul255(rgba[2], rgba[3]),
                    rgba[3],
                ];
            }
            dst.copy_from_slice(&rgba);
        }
    }
    Ok(out)
}

/// Packs unpremultiplied RGBA into `format` rows of `stride` bytes.
///
/// `dst` is resized to `stride * height`, reusing its allocation when it is
/// already large enough.
pub fn from_rgba_into(
    src: &RgbaBuffer,
    format: PixelFormat,
    alpha: AlphaType,
    stride: usize,
    dst: &mut Vec<u8>,
) -> Result<()> {
    let bpp = format.bytes_per_pixel();
    if bpp == 0 {
        return Err(Error::UnsupportedFormat(format!("cannot write {format} pixels")));
    }
    let row = src.width as usize * bpp;
    if stride < row {
        return Err(Error::InvalidArgument(format!(
            "stride {stride} is shorter than a {format} row of {row} bytes"
        )));
    }

    let len = stride.checked_mul(src.height as usize).ok_or_else(|| {
        Error::InvalidArgument(format!("stride {stride} overflows {} rows", src.height))
    })?;
    dst.clear();
    dst.resize(len, 0);
    for (y, src_row) in src.data.chunks_exact(src.width as usize * 4).enumerate() {
        let dst_row = &mut dst[y * stride..y * stride + row];
        for (px, out) in src_row.chunks_exact(4).zip(dst_row.chunks_exact_mut(bpp)) {
            let mut rgba = [px[0], px[1], px[2], px[3]];
            if alpha == AlphaType::Premul && format.has_alpha() {
                rgba = [
                    premul255(rgba[0], rgba[3]),
                    premul255(rgba[1], rgba[3]),
                    premul255(rgba[2], rgba[3]),
                    rgba[3],
                ];
            }
            pack(format, rgba, out);
        }
    }
    Ok(())
}

pub fn from_rgba(
    src: &RgbaBuffer,
    format: PixelFormat,
    alpha: AlphaType,
    stride: usize,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    from_rgba_into(src, format, alpha, stride, &mut out)?;
    Ok(out)
}

/// Copies `region` out of `src`; the region must lie inside the image.
pub fn crop(src: &RgbaBuffer, region: &Region) -> Result<RgbaBuffer> {
    region.check_within(src.size())?;
    if *region == Region::full(src.size()) {
        return Ok(src.clone());
    }

    let mut out = RgbaBuffer::new(region.width, region.height)?;
    let row = region.width as usize * 4;
    for y in 0..region.height as usize {
        let sy = region.y as usize + y;
        let start = (sy * src.width as usize + region.x as usize) * 4;
        out.data[y * row..(y + 1) * row].copy_from_slice(&src.data[start..start + row]);
    }
    Ok(out)
}

/// Downsamples by an integer factor keeping pixel `(x * factor, y * factor)`.
///
/// The result is `max(1, width / factor)` by `max(1, height / factor)`.
pub fn sample(src: &RgbaBuffer, factor: u32) -> Result<RgbaBuffer> {
    if factor == 0 {
        return Err(Error::InvalidArgument("sample size must be at least 1".into()));
    }
    if factor == 1 {
        return Ok(src.clone());
    }

    let width = (src.width / factor).max(1);
    let height = (src.height / factor).max(1);
    let mut out = RgbaBuffer::new(width, height)?;
    for y in 0..height {
        for x in 0..width {
            out.put(x, y, src.pixel(x * factor, y * factor));
        }
    }
    Ok(out)
}

/// Nearest-neighbour resample to exactly `size`.
pub fn resize(src: &RgbaBuffer, size: Size) -> Result<RgbaBuffer> {
    if size.is_empty() {
        return Err(Error::InvalidArgument(format!("cannot resize to {size}")));
    }
    if size == src.size() {
        return Ok(src.clone());
    }

    let mut out = RgbaBuffer::new(size.width, size.height)?;
    for y in 0..size.height {
        let sy = (y as u64 * src.height as u64 / size.height as u64) as u32;
        for x in 0..size.width {
            let sx = (x as u64 * src.width as u64 / size.width as u64) as u32;
            out.put(x, y, src.pixel(sx, sy));
        }
    }
    Ok(out)
}

/// Rotates clockwise.
///
/// Quarter turns are exact transposes. Other angles map each destination
/// pixel back into the source with nearest-neighbour sampling; the output
/// is the bounding box of the rotated image and uncovered pixels are
/// transparent black.
pub fn rotate(src: &RgbaBuffer, rotation: Rotation) -> Result<RgbaBuffer> {
    let (w, h) = (src.width, src.height);
    Ok(match rotation {
        Rotation::Rotation0 => src.clone(),
        Rotation::Rotation90 => {
            let mut out = RgbaBuffer::new(h, w)?;
            for y in 0..w {
                for x in 0..h {
                    out.put(x, y, src.pixel(y, h - 1 - x));
                }
            }
            out
        }
        Rotation::Rotation180 => {
            let mut out = RgbaBuffer::new(w, h)?;
            for y in 0..h {
                for x in 0..w {
                    out.put(x, y, src.pixel(w - 1 - x, h - 1 - y));
                }
            }
            out
        }
        Rotation::Rotation270 => {
            let mut out = RgbaBuffer::new(h, w)?;
            for y in 0..w {
                for x in 0..h {
                    out.put(x, y, src.pixel(w - 1 - y, x));
                }
            }
            out
        }
        Rotation::Degrees(degrees) => {
            let (sin, cos) = degrees.to_radians().sin_cos();
            let (wf, hf) = (w as f64, h as f64);
            let Size {
                width: out_w,
                height: out_h,
            } = rotated_size(src.size(), rotation);

            let mut out = RgbaBuffer::new(out_w, out_h)?;
            let (cx, cy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);
            for y in 0..out_h {
                let dy = y as f64 + 0.5 - cy;
                for x in 0..out_w {
                    let dx = x as f64 + 0.5 - cx;
                    let sx = (dx * cos + dy * sin + wf / 2.0).floor();
                    let sy = (-dx * sin + dy * cos + hf / 2.0).floor();
                    if sx >= 0.0 && sy >= 0.0 && sx < wf && sy < hf {
                        out.put(x, y, src.pixel(sx as u32, sy as u32));
                    }
                }
            }
            out
        }
    })
}

/// Size of the output of [`rotate`] for an input of `size`.
pub fn rotated_size(size: Size, rotation: Rotation) -> Size {
    match rotation {
        Rotation::Rotation0 | Rotation::Rotation180 => size,
        Rotation::Rotation90 | Rotation::Rotation270 => Size::new(size.height, size.width),
        Rotation::Degrees(degrees) => {
            let (sin, cos) = degrees.to_radians().sin_cos();
            let (wf, hf) = (size.width as f64, size.height as f64);
            // the float to int casts saturate
            let side = |v: f64| (v - 1e-6).ceil().max(1.0) as u32;
            Size::new(
                side(wf * cos.abs() + hf * sin.abs()),
                side(wf * sin.abs() + hf * cos.abs()),
            )
        }
    }
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Converts full-range BT.601 4:2:2 semi-planar YCbCr into RGBA.
///
/// `data` holds a `width * height` luma plane followed by an equally sized
/// plane of interleaved Cb/Cr pairs, one pair per two horizontal pixels.
pub fn ycbcr422sp_to_rgba(data: &[u8], width: u32, height: u32) -> Result<RgbaBuffer> {
    let (w, h) = (width as usize, height as usize);
    if w % 2 != 0 {
        return Err(Error::InvalidArgument(format!(
            "4:2:2 frames need an even width, got {width}"
        )));
    }
    if data.len() < w * h * 2 {
        return Err(Error::BufferTooSmall {
            required: w * h * 2,
            available: data.len(),
        });
    }

    let (luma, chroma) = data.split_at(w * h);
    let mut out = RgbaBuffer::new(width, height)?;
    for y in 0..h {
        for x in 0..w {
            let yy = luma[y * w + x] as i32;
            let c = y * w + (x & !1);
            let cb = chroma[c] as i32 - 128;
            let cr = chroma[c + 1] as i32 - 128;
            // 16.16 fixed point JFIF coefficients
            let r = yy + ((91881 * cr + 32768) >> 16);
            let g = yy - ((22554 * cb + 46802 * cr + 32768) >> 16);
            let b = yy + ((116130 * cb + 32768) >> 16);
            out.put(
                x as u32,
                y as u32,
                [clamp_u8(r), clamp_u8(g), clamp_u8(b), 0xff],
            );
        }
    }
    Ok(out)
}

/// Converts RGBA into full-range BT.601 4:2:2 semi-planar YCbCr.
///
/// Chroma is averaged over each horizontal pixel pair.
pub fn rgba_to_ycbcr422sp(src: &RgbaBuffer) -> Result<Vec<u8>> {
    let (w, h) = (src.width as usize, src.height as usize);
    if w % 2 != 0 {
        return Err(Error::InvalidArgument(format!(
            "4:2:2 frames need an even width, got {w}"
        )));
    }

    let mut out = vec![0u8; w * h * 2];
    let (luma, chroma) = out.split_at_mut(w * h);
    for y in 0..h {
        for x in (0..w).step_by(2) {
            let mut cb = 0;
            let mut cr = 0;
            for dx in 0..2 {
                let [r, g, b, _] = src.pixel((x + dx) as u32, y as u32);
                let (r, g, b) = (r as i32, g as i32, b as i32);
                luma[y * w + x + dx] = clamp_u8((19595 * r + 38470 * g + 7471 * b + 32768) >> 16);
                cb += (-11059 * r - 21709 * g + 32768 * b) >> 16;
                cr += (32768 * r - 27439 * g - 5329 * b) >> 16;
            }
            chroma[y * w + x] = clamp_u8(cb / 2 + 128);
            chroma[y * w + x + 1] = clamp_u8(cr / 2 + 128);
        }
    }
    Ok(out)
}
