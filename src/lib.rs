// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst Image Library
//!
//! This library provides the image pipeline backend used by the EdgeFirst
//! image tools: decoding of encoded images into pixel maps, pixel map
//! manipulation, encoding back into compressed formats, and a bounded queue
//! receiving frames from a camera producer.
//!
//! ## Features
//!
//! - **Pixel Maps**: Strided pixel buffers in RGBA, BGRA, ARGB, RGB, RGB565
//!   and alpha-only formats with bounds-checked region I/O and explicit
//!   release.
//! - **Decoding**: JPEG through turbojpeg, PNG, GIF (multi-frame) and BMP
//!   through the `image` crate, with crop, downsampling, resizing, rotation
//!   and format conversion applied in a fixed order.
//! - **Packing**: JPEG encoding with quality control and lossless PNG.
//! - **Receiving**: Capacity-bounded frame queues with FIFO and
//!   latest-wins reads and an arrival callback.
//! - **Asynchronous Forms**: Every long-running operation has an `_async`
//!   form returning a [`Completion`] which can be awaited or given a
//!   callback.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_image::{create_image_packer, create_image_source, DecodeOptions, PackingOption};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = create_image_source("file:///tmp/input.png")?;
//! let map = source.create_pixel_map(DecodeOptions {
//!     sample_size: 2,
//!     rotate: 90.0,
//!     ..Default::default()
//! })?;
//!
//! let jpeg = create_image_packer().pack(&map, &PackingOption::new("image/jpeg", 85))?;
//! std::fs::write("/tmp/output.jpg", jpeg)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Release
//!
//! Handles are cheap to clone and share their underlying resource. Each
//! resource is released exactly once; a second release, and any other use
//! after release, fails with [`Error::AlreadyReleased`].
//!
//! ## Safety
//!
//! The only `unsafe` code duplicates caller supplied file descriptors in
//! [`create_image_source_from_fd`].

pub mod completion;
pub mod convert;
pub mod decoder;
pub mod error;
pub mod exif;
pub mod factory;
pub mod format;
pub mod image_source;
pub mod packer;
pub mod pixel_map;
pub mod receiver;

pub use completion::Completion;
pub use decoder::DecodeOptions;
pub use error::{Error, Result};
pub use exif::PropertyKey;
#[cfg(unix)]
pub use factory::create_image_source_from_fd;
pub use factory::{
    create_image_packer, create_image_receiver, create_image_source,
    create_image_source_from_data, create_incremental_source, create_pixel_map,
    create_pixel_map_from_colors,
};
pub use format::{
    AlphaType, ColorSpace, ComponentType, ImageFormat, ImageInfo, InitializationOptions,
    PixelFormat, PositionArea, Region, Size,
};
pub use image_source::{ImageSource, PropertyOptions};
pub use packer::{ImagePacker, PackSource, PackingOption};
pub use pixel_map::PixelMap;
pub use receiver::{Component, Image, ImageReceiver, ProducerSurface, ReceiverEvent, ReceiverState};
