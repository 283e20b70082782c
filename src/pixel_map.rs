// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    completion::Completion,
    convert::{self, RgbaBuffer},
    error::{Error, Result},
    format::{
        AlphaType, ColorSpace, ImageInfo, InitializationOptions, PixelFormat, PositionArea,
        Region, Size,
    },
};
use core::fmt;
use parking_lot::RwLock;
use std::{mem, sync::Arc};
use tracing::debug;

/// Largest pixel map the crate will allocate, in bytes.
pub const MAX_PIXEL_MAP_BYTES: usize = 600 * 1024 * 1024;

#[derive(Debug)]
enum Storage {
    Live(Vec<u8>),
    Released,
    /// The memory now belongs to another pixel map through buffer reuse.
    Transferred,
}

#[derive(Debug)]
struct State {
    storage: Storage,
    info: ImageInfo,
    stride: usize,
    editable: bool,
}

impl State {
    fn data(&self) -> Result<&[u8]> {
        match &self.storage {
            Storage::Live(data) => Ok(data),
            Storage::Released | Storage::Transferred => Err(Error::AlreadyReleased),
        }
    }

    fn data_mut(&mut self) -> Result<&mut [u8]> {
        match &mut self.storage {
            Storage::Live(data) => Ok(data),
            Storage::Released | Storage::Transferred => Err(Error::AlreadyReleased),
        }
    }

    fn writable(&mut self) -> Result<&mut [u8]> {
        // report release before editability, a released map has no flags
        self.data()?;
        if !self.editable {
            return Err(Error::NotEditable);
        }
        self.data_mut()
    }

    fn bpp(&self) -> usize {
        self.info.pixel_format.bytes_per_pixel()
    }

    /// Byte offset of the region's first pixel and the length of one of
    /// its rows, after checking the region against the map's bounds.
    fn region_span(&self, region: &Region) -> Result<(usize, usize)> {
        region.check_within(self.info.size)?;
        let start = region.y as usize * self.stride + region.x as usize * self.bpp();
        Ok((start, region.width as usize * self.bpp()))
    }

    fn pixel_offset(&self, x: u32, y: u32) -> Result<usize> {
        let size = self.info.size;
        if x >= size.width || y >= size.height {
            return Err(Error::OutOfRange(format!(
                "pixel ({x}, {y}) outside {size}"
            )));
        }
        Ok(y as usize * self.stride + x as usize * self.bpp())
    }
}

/// Checks a caller's [`PositionArea`] can hold `region` rows of `row` bytes.
fn check_area(area: &PositionArea, row: usize) -> Result<()> {
    if area.stride < row {
        return Err(Error::InvalidArgument(format!(
            "area stride {} is shorter than a region row of {row} bytes",
            area.stride
        )));
    }
    let required = area
        .stride
        .checked_mul(area.region.height.saturating_sub(1) as usize)
        .and_then(|len| len.checked_add(area.offset))
        .and_then(|len| len.checked_add(row))
        .unwrap_or(usize::MAX);
    if area.pixels.len() < required {
        return Err(Error::BufferTooSmall {
            required,
            available: area.pixels.len(),
        });
    }
    Ok(())
}

/// Row stride and byte length of a `size` map in `format`.
pub(crate) fn layout(size: Size, format: PixelFormat) -> Result<(usize, usize)> {
    checked_len(size, format)
}

fn checked_len(size: Size, format: PixelFormat) -> Result<(usize, usize)> {
    if size.is_empty() {
        return Err(Error::InvalidArgument(format!("invalid pixel map size {size}")));
    }
    if format == PixelFormat::Unknown {
        return Err(Error::InvalidArgument("pixel format must be specified".into()));
    }
    let stride = size.width as usize * format.bytes_per_pixel();
    let len = stride
        .checked_mul(size.height as usize)
        .filter(|len| *len <= MAX_PIXEL_MAP_BYTES)
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{size} {format} exceeds the {MAX_PIXEL_MAP_BYTES} byte limit"
            ))
        })?;
    Ok((stride, len))
}

fn resolve_alpha(requested: AlphaType, format: PixelFormat) -> AlphaType {
    if !format.has_alpha() {
        return AlphaType::Opaque;
    }
    match requested {
        AlphaType::Unknown | AlphaType::Opaque => format.natural_alpha(),
        other => other,
    }
}

/// Decoded pixels with explicit format and stride.
///
/// A `PixelMap` is a handle: clones refer to the same pixel memory. The
/// memory lives until [`release`](PixelMap::release) is called, after which
/// every operation on every clone fails with [`Error::AlreadyReleased`].
///
/// Release takes the buffer's write lock, so it waits for any read or write
/// already in progress; operations issued after the release fail.
///
/// # Example
///
/// ```
/// use edgefirst_image::{InitializationOptions, PixelFormat, PixelMap, Region};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let opts = InitializationOptions::new(4, 4, PixelFormat::Rgba8888).editable(true);
/// let map = PixelMap::new(opts)?;
/// assert_eq!(map.byte_count()?, 64);
///
/// let region = Region::new(1, 1, 2, 2);
/// map.write_region(&region, &[0xff; 16])?;
/// assert_eq!(map.read_region(&region)?, vec![0xff; 16]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PixelMap {
    state: Arc<RwLock<State>>,
}

impl PixelMap {
    /// Allocates a zeroed pixel map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the size is empty, the format is
    /// `Unknown`, or the buffer would exceed [`MAX_PIXEL_MAP_BYTES`].
    pub fn new(opts: InitializationOptions) -> Result<Self> {
        let (stride, len) = checked_len(opts.size, opts.pixel_format)?;
        let info = ImageInfo {
            size: opts.size,
            pixel_format: opts.pixel_format,
            color_space: ColorSpace::Srgb,
            alpha_type: resolve_alpha(opts.alpha_type, opts.pixel_format),
        };
        debug!("pixel map {} {} allocated", opts.size, opts.pixel_format);
        Ok(Self::from_parts(info, stride, vec![0; len], opts.editable))
    }

    /// Imports colors given as BGRA_8888, converting them to the requested
    /// format (`Unknown` selects RGBA_8888) and alpha type.
    pub fn from_colors(colors: &[u8], opts: InitializationOptions) -> Result<Self> {
        let format = opts.pixel_format.or_default();
        let (stride, _) = checked_len(opts.size, format)?;
        let needed = opts.size.width as usize * opts.size.height as usize * 4;
        if colors.len() < needed {
            return Err(Error::InvalidArgument(format!(
                "colors hold {} bytes, {} needed for {}",
                colors.len(),
                needed,
                opts.size
            )));
        }

        let rgba = convert::to_rgba(
            colors,
            opts.size.width as usize * 4,
            opts.size,
            PixelFormat::Bgra8888,
            AlphaType::Unpremul,
        )?;
        let alpha = resolve_alpha(opts.alpha_type, format);
        let data = convert::from_rgba(&rgba, format, alpha, stride)?;
        let info = ImageInfo {
            size: opts.size,
            pixel_format: format,
            color_space: ColorSpace::Srgb,
            alpha_type: alpha,
        };
        Ok(Self::from_parts(info, stride, data, opts.editable))
    }

    /// Copies `region` of `source` (all of it when `None`) into a new map.
    ///
    /// A non-empty `opts.size` different from the region scales the copy
    /// with nearest-neighbour sampling; an `Unknown` format keeps the
    /// source format.
    pub fn create_from(
        source: &PixelMap,
        region: Option<Region>,
        opts: InitializationOptions,
    ) -> Result<Self> {
        let (rgba, src_info) = {
            let state = source.state.read();
            let data = state.data()?;
            let rgba = convert::to_rgba(
                data,
                state.stride,
                state.info.size,
                state.info.pixel_format,
                state.info.alpha_type,
            )?;
            (rgba, state.info)
        };

        let region = region.unwrap_or(Region::full(src_info.size));
        let mut rgba = convert::crop(&rgba, &region)?;
        if !opts.size.is_empty() {
            rgba = convert::resize(&rgba, opts.size)?;
        }

        let format = match opts.pixel_format {
            PixelFormat::Unknown => src_info.pixel_format,
            other => other,
        };
        let alpha_request = match opts.alpha_type {
            AlphaType::Unknown => src_info.alpha_type,
            other => other,
        };
        Self::from_rgba(&rgba, format, alpha_request, opts.editable, None)
    }

    /// Packs an RGBA buffer into a new map, reusing `reuse` as backing
    /// memory when given.
    pub(crate) fn from_rgba(
        rgba: &RgbaBuffer,
        format: PixelFormat,
        alpha: AlphaType,
        editable: bool,
        reuse: Option<Vec<u8>>,
    ) -> Result<Self> {
        let (stride, _) = checked_len(rgba.size(), format)?;
        let alpha = resolve_alpha(alpha, format);
        let mut data = reuse.unwrap_or_default();
        convert::from_rgba_into(rgba, format, alpha, stride, &mut data)?;
        let info = ImageInfo {
            size: rgba.size(),
            pixel_format: format,
            color_space: ColorSpace::Srgb,
            alpha_type: alpha,
        };
        Ok(Self::from_parts(info, stride, data, editable))
    }

    fn from_parts(info: ImageInfo, stride: usize, data: Vec<u8>, editable: bool) -> Self {
        PixelMap {
            state: Arc::new(RwLock::new(State {
                storage: Storage::Live(data),
                info,
                stride,
                editable,
            })),
        }
    }

    pub fn info(&self) -> Result<ImageInfo> {
        let state = self.state.read();
        state.data()?;
        Ok(state.info)
    }

    pub fn size(&self) -> Result<Size> {
        Ok(self.info()?.size)
    }

    pub fn pixel_format(&self) -> Result<PixelFormat> {
        Ok(self.info()?.pixel_format)
    }

    pub fn is_editable(&self) -> Result<bool> {
        let state = self.state.read();
        state.data()?;
        Ok(state.editable)
    }

    /// Row stride in bytes.
    pub fn bytes_per_row(&self) -> Result<usize> {
        let state = self.state.read();
        state.data()?;
        Ok(state.stride)
    }

    /// Bytes occupied by the pixels, always `bytes_per_row * height`.
    pub fn byte_count(&self) -> Result<usize> {
        let state = self.state.read();
        Ok(state.data()?.len())
    }

    /// Bytes allocated for the pixels, at least [`byte_count`](Self::byte_count).
    pub fn capacity(&self) -> Result<usize> {
        let state = self.state.read();
        match &state.storage {
            Storage::Live(data) => Ok(data.capacity()),
            Storage::Released | Storage::Transferred => Err(Error::AlreadyReleased),
        }
    }

    pub fn is_released(&self) -> bool {
        !matches!(self.state.read().storage, Storage::Live(_))
    }

    /// Reads `region` as tightly packed rows of `width * bytes_per_pixel`.
    pub fn read_region(&self, region: &Region) -> Result<Vec<u8>> {
        let state = self.state.read();
        let data = state.data()?;
        let (start, row) = state.region_span(region)?;

        let mut out = Vec::with_capacity(row * region.height as usize);
        for y in 0..region.height as usize {
            let offset = start + y * state.stride;
            out.extend_from_slice(&data[offset..offset + row]);
        }
        Ok(out)
    }

    /// Writes tightly packed `bytes` into `region`.
    ///
    /// Nothing is written unless the whole region is valid.
    pub fn write_region(&self, region: &Region, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        state.writable()?;
        let (start, row) = state.region_span(region)?;
        let needed = row * region.height as usize;
        if bytes.len() < needed {
            return Err(Error::InvalidArgument(format!(
                "{} bytes supplied for a {needed} byte region",
                bytes.len()
            )));
        }

        let stride = state.stride;
        let data = state.data_mut()?;
        for (y, src) in bytes.chunks_exact(row).take(region.height as usize).enumerate() {
            let offset = start + y * stride;
            data[offset..offset + row].copy_from_slice(src);
        }
        Ok(())
    }

    /// Reads `area.region` into `area.pixels` starting at `area.offset`,
    /// advancing `area.stride` bytes per row.
    pub fn read_pixels(&self, area: &mut PositionArea) -> Result<()> {
        let state = self.state.read();
        let data = state.data()?;
        let (start, row) = state.region_span(&area.region)?;
        check_area(area, row)?;

        for y in 0..area.region.height as usize {
            let src = start + y * state.stride;
            let dst = area.offset + y * area.stride;
            area.pixels[dst..dst + row].copy_from_slice(&data[src..src + row]);
        }
        Ok(())
    }

    /// Writes `area.pixels` into `area.region`, the inverse of
    /// [`read_pixels`](Self::read_pixels).
    pub fn write_pixels(&self, area: &PositionArea) -> Result<()> {
        let mut state = self.state.write();
        state.writable()?;
        let (start, row) = state.region_span(&area.region)?;
        check_area(area, row)?;

        let stride = state.stride;
        let data = state.data_mut()?;
        for y in 0..area.region.height as usize {
            let dst = start + y * stride;
            let src = area.offset + y * area.stride;
            data[dst..dst + row].copy_from_slice(&area.pixels[src..src + row]);
        }
        Ok(())
    }

    /// Copies all pixels, stride included, into the front of `dst`.
    pub fn read_to_buffer(&self, dst: &mut [u8]) -> Result<()> {
        let state = self.state.read();
        let data = state.data()?;
        if dst.len() < data.len() {
            return Err(Error::BufferTooSmall {
                required: data.len(),
                available: dst.len(),
            });
        }
        dst[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Replaces all pixels with the front of `src`.
    pub fn write_from_buffer(&self, src: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        let data = state.writable()?;
        if src.len() < data.len() {
            return Err(Error::BufferTooSmall {
                required: data.len(),
                available: src.len(),
            });
        }
        let len = data.len();
        data.copy_from_slice(&src[..len]);
        Ok(())
    }

    /// Reads one pixel as `0xAARRGGBB`.
    pub fn pixel_argb(&self, x: u32, y: u32) -> Result<u32> {
        let state = self.state.read();
        let data = state.data()?;
        let offset = state.pixel_offset(x, y)?;
        let [r, g, b, a] = convert::unpack(
            state.info.pixel_format,
            &data[offset..offset + state.bpp()],
        );
        Ok(u32::from_be_bytes([a, r, g, b]))
    }

    /// Writes one pixel given as `0xAARRGGBB`.
    pub fn write_pixel(&self, x: u32, y: u32, argb: u32) -> Result<()> {
        let mut state = self.state.write();
        state.writable()?;
        let offset = state.pixel_offset(x, y)?;
        let (format, bpp) = (state.info.pixel_format, state.bpp());
        let [a, r, g, b] = argb.to_be_bytes();
        let data = state.data_mut()?;
        convert::pack(format, [r, g, b, a], &mut data[offset..offset + bpp]);
        Ok(())
    }

    /// Sets every pixel to `0xAARRGGBB`.
    pub fn fill(&self, argb: u32) -> Result<()> {
        let mut state = self.state.write();
        state.writable()?;
        let (format, bpp, stride) = (state.info.pixel_format, state.bpp(), state.stride);
        let width = state.info.size.width as usize;
        let [a, r, g, b] = argb.to_be_bytes();
        let mut px = vec![0u8; bpp];
        convert::pack(format, [r, g, b, a], &mut px);

        let data = state.data_mut()?;
        for row in data.chunks_exact_mut(stride) {
            for out in row[..width * bpp].chunks_exact_mut(bpp) {
                out.copy_from_slice(&px);
            }
        }
        Ok(())
    }

    /// Changes the alpha interpretation, premultiplying or unpremultiplying
    /// the color channels when switching between the two.
    pub fn set_alpha_type(&self, alpha: AlphaType) -> Result<()> {
        let mut state = self.state.write();
        state.data()?;
        let format = state.info.pixel_format;
        if !format.has_alpha() {
            if alpha == AlphaType::Opaque {
                return Ok(());
            }
            return Err(Error::InvalidArgument(format!(
                "{format} has no alpha channel"
            )));
        }
        if alpha == AlphaType::Unknown {
            return Err(Error::InvalidArgument("alpha type must be specified".into()));
        }

        let current = state.info.alpha_type;
        let convert_pixels = format != PixelFormat::Alpha8
            && matches!(
                (current, alpha),
                (AlphaType::Premul, AlphaType::Unpremul) | (AlphaType::Unpremul, AlphaType::Premul)
            );
        if convert_pixels {
            let (size, stride) = (state.info.size, state.stride);
            let data = state.data_mut()?;
            let rgba = convert::to_rgba(data, stride, size, format, current)?;
            let packed = convert::from_rgba(&rgba, format, alpha, stride)?;
            data.copy_from_slice(&packed);
        }
        state.info.alpha_type = alpha;
        Ok(())
    }

    /// Unpacks the pixels into unpremultiplied RGBA.
    pub(crate) fn to_rgba(&self) -> Result<RgbaBuffer> {
        let state = self.state.read();
        let data = state.data()?;
        convert::to_rgba(
            data,
            state.stride,
            state.info.size,
            state.info.pixel_format,
            state.info.alpha_type,
        )
    }

    /// Moves the backing memory out for reuse by a new pixel map after
    /// checking it can hold `required` bytes. On error the map is untouched.
    pub(crate) fn take_storage(&self, required: usize) -> Result<Vec<u8>> {
        let mut state = self.state.write();
        let available = match &state.storage {
            Storage::Live(data) => data.capacity(),
            Storage::Released | Storage::Transferred => return Err(Error::AlreadyReleased),
        };
        if available < required {
            return Err(Error::BufferTooSmall {
                required,
                available,
            });
        }
        match mem::replace(&mut state.storage, Storage::Transferred) {
            Storage::Live(data) => {
                debug!("pixel map memory ({available} bytes) transferred for reuse");
                Ok(data)
            }
            Storage::Released | Storage::Transferred => Err(Error::AlreadyReleased),
        }
    }

    /// Frees the pixel memory. A second release fails with
    /// [`Error::AlreadyReleased`].
    pub fn release(&self) -> Result<()> {
        let mut state = self.state.write();
        match mem::replace(&mut state.storage, Storage::Released) {
            Storage::Live(data) => {
                debug!("pixel map {} released ({} bytes)", state.info.size, data.len());
                Ok(())
            }
            previous => {
                state.storage = previous;
                Err(Error::AlreadyReleased)
            }
        }
    }

    pub fn info_async(&self) -> Completion<ImageInfo> {
        let map = self.clone();
        Completion::blocking(move || map.info())
    }

    pub fn read_region_async(&self, region: Region) -> Completion<Vec<u8>> {
        let map = self.clone();
        Completion::blocking(move || map.read_region(&region))
    }

    pub fn write_region_async(&self, region: Region, bytes: Vec<u8>) -> Completion<()> {
        let map = self.clone();
        Completion::blocking(move || map.write_region(&region, &bytes))
    }

    /// Fills the area's pixels and hands the area back.
    pub fn read_pixels_async(&self, mut area: PositionArea) -> Completion<PositionArea> {
        let map = self.clone();
        Completion::blocking(move || {
            map.read_pixels(&mut area)?;
            Ok(area)
        })
    }

    pub fn write_pixels_async(&self, area: PositionArea) -> Completion<()> {
        let map = self.clone();
        Completion::blocking(move || map.write_pixels(&area))
    }

    pub fn read_to_buffer_async(&self, mut dst: Vec<u8>) -> Completion<Vec<u8>> {
        let map = self.clone();
        Completion::blocking(move || {
            map.read_to_buffer(&mut dst)?;
            Ok(dst)
        })
    }

    pub fn write_from_buffer_async(&self, src: Vec<u8>) -> Completion<()> {
        let map = self.clone();
        Completion::blocking(move || map.write_from_buffer(&src))
    }

    pub fn release_async(&self) -> Completion<()> {
        let map = self.clone();
        Completion::blocking(move || map.release())
    }
}

impl fmt::Debug for PixelMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("PixelMap")
            .field("info", &state.info)
            .field("stride", &state.stride)
            .field("editable", &state.editable)
            .field("released", &!matches!(state.storage, Storage::Live(_)))
            .finish()
    }
}

impl fmt::Display for PixelMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state.read();
        write!(
            f,
            "{} {} stride:{}",
            state.info.size, state.info.pixel_format, state.stride
        )
    }
}
