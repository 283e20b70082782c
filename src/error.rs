// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::io;

/// Errors reported by every image pipeline operation.
///
/// Asynchronous operations deliver the same variants through their
/// [`Completion`](crate::completion::Completion), whether it is awaited or
/// consumed with a callback.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A size, quality, format, angle or other argument is not acceptable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The container or codec is not recognized.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The encoded bytes could not be parsed.
    #[error("corrupt image data: {0}")]
    CorruptData(String),

    /// A region, coordinate or frame index exceeds the available bounds.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// A caller supplied buffer cannot hold the requested pixels.
    #[error("buffer too small: {required} bytes required, {available} available")]
    BufferTooSmall { required: usize, available: usize },

    /// A write was attempted on a pixel map created without `editable`.
    #[error("pixel map is not editable")]
    NotEditable,

    /// The handle was released, or its memory was transferred elsewhere.
    #[error("resource already released")]
    AlreadyReleased,

    /// No image is waiting in the receiver queue.
    #[error("receiver queue is empty")]
    QueueEmpty,

    /// The receiver already holds `capacity` unreleased images.
    #[error("receiver queue is full ({capacity} outstanding images)")]
    QueueFull { capacity: usize },

    /// An incremental source has not received enough data yet.
    #[error("image data incomplete: {0}")]
    Incomplete(String),

    /// The requested property is absent and no default was supplied.
    #[error("property not found: {0}")]
    PropertyNotFound(String),

    /// The worker ended without producing a result.
    #[error("operation interrupted: {0}")]
    Interrupted(String),

    /// Reading from a URI or file descriptor failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<gif::DecodingError> for Error {
    fn from(err: gif::DecodingError) -> Self {
        match err {
            gif::DecodingError::Io(err) => Error::CorruptData(format!("truncated GIF: {err}")),
            other => Error::CorruptData(other.to_string()),
        }
    }
}

impl From<turbojpeg::Error> for Error {
    fn from(err: turbojpeg::Error) -> Self {
        Error::CorruptData(err.to_string())
    }
}
