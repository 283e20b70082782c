// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand};
use edgefirst_image::{ImageFormat, PixelFormat};
use std::path::PathBuf;

/// Pixel formats selectable for decoded output.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum OutputFormat {
    /// 32-bit RGBA, 8 bits per channel
    Rgba,
    /// 32-bit BGRA, 8 bits per channel
    Bgra,
    /// 32-bit ARGB, 8 bits per channel
    Argb,
    /// 24-bit RGB without alpha
    Rgb,
    /// 16-bit RGB 5:6:5
    Rgb565,
    /// 8-bit alpha only
    Alpha,
}

impl From<OutputFormat> for PixelFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Rgba => PixelFormat::Rgba8888,
            OutputFormat::Bgra => PixelFormat::Bgra8888,
            OutputFormat::Argb => PixelFormat::Argb8888,
            OutputFormat::Rgb => PixelFormat::Rgb888,
            OutputFormat::Rgb565 => PixelFormat::Rgb565,
            OutputFormat::Alpha => PixelFormat::Alpha8,
        }
    }
}

/// Frame formats the synthetic producer can deliver.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum FrameFormat {
    /// 4:2:2 semi-planar YCbCr
    Ycbcr,
    /// JPEG bitstream per frame
    Jpeg,
}

impl From<FrameFormat> for ImageFormat {
    fn from(format: FrameFormat) -> Self {
        match format {
            FrameFormat::Ycbcr => ImageFormat::YCbCr422Sp,
            FrameFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Command-line arguments for the EdgeFirst image tool.
///
/// Every option can also be given through the environment variable named in
/// its help text.
///
/// # Example
///
/// ```bash
/// # Decode, rotate and re-encode an image
/// edgefirst-image transcode input.png output.jpg --rotate 90 --quality 85
///
/// # Run the receiver pipeline against a synthetic camera
/// export RECEIVE_FRAMES=30
/// edgefirst-image receive --output /tmp/frames
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(short, long, env = "VERBOSE", global = true)]
    pub verbose: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY", global = true)]
    pub tracy: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the dimensions, frame count and properties of an image
    Info {
        /// Image path or file:// URI
        input: String,

        /// Frame index for multi-frame images
        #[arg(long, env = "FRAME_INDEX", default_value = "0")]
        index: u32,
    },

    /// Decode an image, transform it and encode the result
    Transcode {
        /// Image path or file:// URI
        input: String,

        /// Output file
        output: PathBuf,

        /// Output MIME type, derived from the output extension when absent
        #[arg(long, env = "TRANSCODE_FORMAT")]
        format: Option<String>,

        /// Encoding quality (0-100)
        #[arg(short, long, env = "QUALITY", default_value = "100")]
        quality: i32,

        /// Frame index for multi-frame images
        #[arg(long, env = "FRAME_INDEX", default_value = "0")]
        index: u32,

        /// Integer downsampling factor
        #[arg(long, env = "SAMPLE_SIZE", default_value = "1")]
        sample_size: u32,

        /// Clockwise rotation in degrees (0-360)
        #[arg(long, env = "ROTATE", default_value = "0")]
        rotate: f32,

        /// Output resolution in pixels (width height), 0 keeps the aspect
        #[arg(
            long,
            env = "OUTPUT_SIZE",
            default_value = "0 0",
            value_delimiter = ' ',
            num_args = 2
        )]
        size: Vec<u32>,

        /// Crop region applied before scaling (x y width height)
        #[arg(long, env = "CROP", value_delimiter = ' ', num_args = 4)]
        crop: Option<Vec<u32>>,

        /// Intermediate pixel format
        #[arg(long, env = "PIXEL_FORMAT", default_value = "rgba", value_enum)]
        pixel_format: OutputFormat,
    },

    /// Feed synthetic camera frames through a receiver queue and store them
    /// as JPEG files
    Receive {
        /// Frame resolution in pixels (width height)
        #[arg(
            long,
            env = "RECEIVE_SIZE",
            default_value = "640 480",
            value_delimiter = ' ',
            num_args = 2
        )]
        size: Vec<u32>,

        /// Frame format delivered by the producer
        #[arg(long, env = "RECEIVE_FORMAT", default_value = "ycbcr", value_enum)]
        format: FrameFormat,

        /// Maximum number of outstanding images
        #[arg(long, env = "RECEIVE_CAPACITY", default_value = "4")]
        capacity: usize,

        /// Number of frames to produce
        #[arg(long, env = "RECEIVE_FRAMES", default_value = "10")]
        frames: usize,

        /// Producer frame rate
        #[arg(long, env = "RECEIVE_FPS", default_value = "30")]
        fps: u32,

        /// Read only the newest image, dropping older unread ones
        #[arg(long, env = "RECEIVE_LATEST")]
        latest: bool,

        /// JPEG quality of stored frames (0-100)
        #[arg(short, long, env = "QUALITY", default_value = "90")]
        quality: i32,

        /// Directory receiving the stored frames
        #[arg(short, long, env = "OUTPUT_DIR", default_value = ".")]
        output: PathBuf,
    },
}
