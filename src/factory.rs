// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Entry points handing out sources, pixel maps, packers and receivers.

use crate::{
    completion::Completion,
    error::Result,
    format::{ImageFormat, InitializationOptions, Size},
    image_source::ImageSource,
    packer::ImagePacker,
    pixel_map::PixelMap,
    receiver::ImageReceiver,
};

/// Opens the file at `uri`, a path or a `file://` URI.
pub fn create_image_source(uri: &str) -> Result<ImageSource> {
    ImageSource::open(uri)
}

/// Reads the image from `fd`. The descriptor is duplicated and stays owned
/// by the caller.
#[cfg(unix)]
pub fn create_image_source_from_fd(fd: std::os::fd::RawFd) -> Result<ImageSource> {
    ImageSource::from_fd(fd)
}

pub fn create_image_source_from_data(data: impl Into<Vec<u8>>) -> ImageSource {
    ImageSource::from_bytes(data.into(), true)
}

/// An empty source fed with [`ImageSource::update_data`].
pub fn create_incremental_source() -> ImageSource {
    ImageSource::from_bytes(Vec::new(), false)
}

/// Allocates a zeroed pixel map on the worker pool. An `Unknown` pixel
/// format selects RGBA_8888.
pub fn create_pixel_map(mut opts: InitializationOptions) -> Completion<PixelMap> {
    opts.pixel_format = opts.pixel_format.or_default();
    Completion::blocking(move || PixelMap::new(opts))
}

/// Imports BGRA colors into a new pixel map on the worker pool.
pub fn create_pixel_map_from_colors(
    colors: Vec<u8>,
    opts: InitializationOptions,
) -> Completion<PixelMap> {
    Completion::blocking(move || PixelMap::from_colors(&colors, opts))
}

pub fn create_image_packer() -> ImagePacker {
    ImagePacker::new()
}

/// Creates an idle receiver; `format` is the raw [`ImageFormat`] value.
pub fn create_image_receiver(
    width: u32,
    height: u32,
    format: i32,
    capacity: usize,
) -> Result<ImageReceiver> {
    ImageReceiver::new(
        Size::new(width, height),
        ImageFormat::try_from(format)?,
        capacity,
    )
}
