// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    completion::Completion,
    decoder::{self, Container, DecodeOptions, DECODE_FORMATS},
    error::{Error, Result},
    exif::{Exif, PropertyKey},
    format::ImageInfo,
    pixel_map::PixelMap,
};
use core::fmt;
use parking_lot::RwLock;
use std::{fs, path::Path, sync::Arc};
use tracing::{debug, instrument};

/// Options for [`ImageSource::property`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyOptions {
    /// Frame whose property is read.
    pub index: u32,
    /// Returned when the property is absent.
    pub default_value: Option<String>,
}

impl PropertyOptions {
    pub fn with_default(default_value: impl Into<String>) -> Self {
        PropertyOptions {
            index: 0,
            default_value: Some(default_value.into()),
        }
    }
}

#[derive(Debug)]
struct State {
    data: Vec<u8>,
    /// False while an incremental source still expects more chunks.
    complete: bool,
    released: bool,
}

/// Handle to an encoded image which has not been decoded yet.
///
/// The source keeps the encoded bytes only. Each call to
/// [`create_pixel_map`](ImageSource::create_pixel_map) decodes again and
/// returns an independently owned [`PixelMap`].
///
/// Incremental sources created with
/// [`create_incremental_source`](crate::create_incremental_source) accept
/// appended chunks through [`update_data`](ImageSource::update_data) until
/// one is marked final. Before that, decoding failures caused by missing
/// data are reported as [`Error::Incomplete`].
#[derive(Clone)]
pub struct ImageSource {
    state: Arc<RwLock<State>>,
}

impl ImageSource {
    pub(crate) fn from_bytes(data: Vec<u8>, complete: bool) -> Self {
        debug!("image source with {} bytes (final: {complete})", data.len());
        ImageSource {
            state: Arc::new(RwLock::new(State {
                data,
                complete,
                released: false,
            })),
        }
    }

    /// Reads the whole file named by `uri`, a plain path or a `file://` URI.
    pub(crate) fn open(uri: &str) -> Result<Self> {
        let path = match uri.strip_prefix("file://") {
            Some(path) => path,
            None if uri.contains("://") => {
                return Err(Error::InvalidArgument(format!("unsupported URI scheme {uri:?}")))
            }
            None => uri,
        };
        if path.is_empty() {
            return Err(Error::InvalidArgument("empty image URI".into()));
        }
        let data = fs::read(Path::new(path))?;
        Ok(ImageSource::from_bytes(data, true))
    }

    /// Reads everything from a duplicate of `fd`; the caller keeps `fd`.
    ///
    /// Regular files are read from the start without moving the caller's
    /// file offset, other descriptors are read until end of stream.
    #[cfg(unix)]
    pub(crate) fn from_fd(fd: std::os::fd::RawFd) -> Result<Self> {
        use std::{
            fs::File,
            io::{self, Read},
            os::{fd::FromRawFd, unix::fs::FileExt},
        };

        if fd < 0 {
            return Err(Error::InvalidArgument(format!("invalid file descriptor {fd}")));
        }
        // SAFETY: dup only reads the descriptor table; an invalid fd is
        // reported through errno.
        let dup = unsafe { libc::dup(fd) };
        if dup < 0 {
            return Err(io::Error::last_os_error().into());
        }
        // SAFETY: dup returned a fresh descriptor nothing else owns.
        let mut file = unsafe { File::from_raw_fd(dup) };

        let meta = file.metadata()?;
        let data = if meta.is_file() {
            let mut data = vec![0; meta.len() as usize];
            file.read_exact_at(&mut data, 0)?;
            data
        } else {
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            data
        };
        Ok(ImageSource::from_bytes(data, true))
    }

    /// Runs `f` over the encoded bytes while holding the source open.
    fn with_data<T>(&self, f: impl FnOnce(&[u8]) -> Result<T>) -> Result<T> {
        let state = self.state.read();
        if state.released {
            return Err(Error::AlreadyReleased);
        }
        match f(&state.data) {
            Err(Error::CorruptData(msg) | Error::UnsupportedFormat(msg)) if !state.complete => {
                Err(Error::Incomplete(format!(
                    "{msg} after {} bytes",
                    state.data.len()
                )))
            }
            other => other,
        }
    }

    /// Appends a chunk of encoded data. Once `is_final` has been passed the
    /// source no longer accepts data.
    pub fn update_data(&self, chunk: &[u8], is_final: bool) -> Result<()> {
        let mut state = self.state.write();
        if state.released {
            return Err(Error::AlreadyReleased);
        }
        if state.complete {
            return Err(Error::InvalidArgument(
                "image source is complete and accepts no more data".into(),
            ));
        }
        state.data.extend_from_slice(chunk);
        state.complete = is_final;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.state.read().complete
    }

    /// MIME types this source is able to decode.
    pub fn supported_formats(&self) -> Result<Vec<String>> {
        self.with_data(|_| Ok(DECODE_FORMATS.iter().map(|s| s.to_string()).collect()))
    }

    pub fn frame_count(&self) -> Result<u32> {
        self.with_data(|data| decoder::frame_count(data, Container::detect(data)?))
    }

    /// Dimensions and layout of frame `index`, read from headers only.
    pub fn info(&self, index: u32) -> Result<ImageInfo> {
        self.with_data(|data| {
            let container = Container::detect(data)?;
            check_index(data, container, index)?;
            decoder::source_info(data, container)
        })
    }

    /// Reads a property such as `"Orientation"` or `"GPSLatitude"`.
    ///
    /// EXIF values are read from JPEG streams. `ImageWidth` and
    /// `ImageLength` fall back to the header dimensions for every container.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an unknown key and
    /// [`Error::PropertyNotFound`] when the property is absent and no default
    /// was given.
    pub fn property(&self, key: &str, opts: &PropertyOptions) -> Result<String> {
        let key: PropertyKey = key.parse()?;
        let found = self.with_data(|data| {
            let container = Container::detect(data)?;
            check_index(data, container, opts.index)?;
            let exif = match container {
                Container::Jpeg => Exif::from_jpeg(data),
                _ => Exif::default(),
            };
            if let Some(value) = exif.get(key) {
                return Ok(Some(value.to_string()));
            }
            Ok(match key {
                PropertyKey::ImageWidth => {
                    Some(decoder::dimensions(data, container)?.width.to_string())
                }
                PropertyKey::ImageLength => {
                    Some(decoder::dimensions(data, container)?.height.to_string())
                }
                _ => None,
            })
        })?;
        found
            .or_else(|| opts.default_value.clone())
            .ok_or_else(|| Error::PropertyNotFound(key.to_string()))
    }

    /// Decodes a new pixel map, see [`decoder::decode`].
    #[instrument(skip_all)]
    pub fn create_pixel_map(&self, options: DecodeOptions) -> Result<PixelMap> {
        self.with_data(|data| decoder::decode(data, options))
    }

    /// Drops the encoded data. A second release fails with
    /// [`Error::AlreadyReleased`].
    pub fn release(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.released {
            return Err(Error::AlreadyReleased);
        }
        state.released = true;
        state.data = Vec::new();
        debug!("image source released");
        Ok(())
    }

    pub fn update_data_async(&self, chunk: Vec<u8>, is_final: bool) -> Completion<()> {
        let source = self.clone();
        Completion::blocking(move || source.update_data(&chunk, is_final))
    }

    pub fn info_async(&self, index: u32) -> Completion<ImageInfo> {
        let source = self.clone();
        Completion::blocking(move || source.info(index))
    }

    pub fn frame_count_async(&self) -> Completion<u32> {
        let source = self.clone();
        Completion::blocking(move || source.frame_count())
    }

    pub fn property_async(&self, key: &str, opts: PropertyOptions) -> Completion<String> {
        let (source, key) = (self.clone(), key.to_string());
        Completion::blocking(move || source.property(&key, &opts))
    }

    pub fn create_pixel_map_async(&self, options: DecodeOptions) -> Completion<PixelMap> {
        let source = self.clone();
        Completion::blocking(move || source.create_pixel_map(options))
    }

    pub fn release_async(&self) -> Completion<()> {
        let source = self.clone();
        Completion::blocking(move || source.release())
    }
}

fn check_index(data: &[u8], container: Container, index: u32) -> Result<()> {
    if index == 0 {
        return Ok(());
    }
    let count = decoder::frame_count(data, container)?;
    if index >= count {
        return Err(Error::OutOfRange(format!(
            "frame index {index} but image has {count} frames"
        )));
    }
    Ok(())
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ImageSource")
            .field("len", &state.data.len())
            .field("complete", &state.complete)
            .field("released", &state.released)
            .finish()
    }
}
