// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::{Args, Command, FrameFormat};
use clap::Parser;
use edgefirst_image::{
    convert::{self, RgbaBuffer},
    create_image_packer, create_image_receiver, create_image_source, DecodeOptions, Error,
    ImageFormat, ImagePacker, InitializationOptions, PackingOption, PixelFormat, PixelMap,
    ProducerSurface, PropertyKey, PropertyOptions, ReceiverEvent, Region, Size,
};
use serde_json::json;
use std::{
    error::Error as StdError,
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, info_span, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _};

fn init_tracing(args: &Args) -> Result<(), Box<dyn StdError>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let stdout_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(level);
    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(level)),
        Err(_) => None,
    };
    let registry = tracing_subscriber::registry()
        .with(stdout_log)
        .with(journald);

    #[cfg(feature = "tracy")]
    let registry = {
        if args.tracy {
            tracy_client::Client::start();
        }
        registry.with(args.tracy.then(tracing_tracy::TracyLayer::default))
    };
    #[cfg(not(feature = "tracy"))]
    if args.tracy {
        eprintln!("tracy support was not compiled in, ignoring --tracy");
    }

    tracing::subscriber::set_global_default(registry)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn StdError>> {
    let args = Args::parse();
    init_tracing(&args)?;

    match args.command {
        Command::Info { input, index } => print_info(&input, index),
        Command::Transcode {
            input,
            output,
            format,
            quality,
            index,
            sample_size,
            rotate,
            size,
            crop,
            pixel_format,
        } => {
            let options = DecodeOptions {
                index,
                sample_size,
                rotate,
                desired_size: Size::new(size[0], size[1]),
                desired_region: crop.map(|c| Region::new(c[0] as i32, c[1] as i32, c[2], c[3])),
                desired_pixel_format: pixel_format.into(),
                ..Default::default()
            };
            let format = format.unwrap_or_else(|| mime_for(&output).to_string());
            transcode(&input, &output, options, PackingOption::new(format, quality)).await
        }
        Command::Receive {
            size,
            format,
            capacity,
            frames,
            fps,
            latest,
            quality,
            output,
        } => {
            let opts = ReceiveOptions {
                size: Size::new(size[0], size[1]),
                format,
                capacity,
                frames,
                fps,
                latest,
                quality,
                output,
            };
            receive(opts).await
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    }
}

fn print_info(input: &str, index: u32) -> Result<(), Box<dyn StdError>> {
    let source = create_image_source(input)?;
    let info = source.info(index)?;
    let opts = PropertyOptions {
        index,
        default_value: None,
    };

    let mut properties = serde_json::Map::new();
    for key in PropertyKey::ALL {
        match source.property(key.as_str(), &opts) {
            Ok(value) => {
                properties.insert(key.to_string(), json!(value));
            }
            Err(Error::PropertyNotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    let report = json!({
        "width": info.size.width,
        "height": info.size.height,
        "pixel_format": info.pixel_format.to_string(),
        "alpha_type": format!("{:?}", info.alpha_type),
        "color_space": format!("{:?}", info.color_space),
        "frames": source.frame_count()?,
        "properties": properties,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    source.release()?;
    Ok(())
}

async fn transcode(
    input: &str,
    output: &Path,
    options: DecodeOptions,
    packing: PackingOption,
) -> Result<(), Box<dyn StdError>> {
    let start = Instant::now();
    let source = create_image_source(input)?;
    let map = source.create_pixel_map_async(options).await?;
    let decoded = start.elapsed();

    let packer = create_image_packer();
    let data = packer.pack_async(map.clone(), packing.clone()).await?;
    fs::write(output, &data)?;
    info!(
        "{input} -> {} as {} ({map}, {} bytes) decode: {decoded:?} total: {:?}",
        output.display(),
        packing.format,
        data.len(),
        start.elapsed()
    );

    map.release()?;
    source.release()?;
    packer.release()?;
    Ok(())
}

struct ReceiveOptions {
    size: Size,
    format: FrameFormat,
    capacity: usize,
    frames: usize,
    fps: u32,
    latest: bool,
    quality: i32,
    output: PathBuf,
}

/// Renders a gradient with a vertical bar that moves with `n`.
fn synthetic_frame(size: Size, n: usize) -> Result<RgbaBuffer, Error> {
    let mut frame = RgbaBuffer::new(size.width, size.height)?;
    let bar = (n * 8) % size.width as usize;
    for (i, px) in frame.data.chunks_exact_mut(4).enumerate() {
        let (x, y) = (i % size.width as usize, i / size.width as usize);
        let shade = if x.abs_diff(bar) < 4 { 255 } else { 0 };
        px.copy_from_slice(&[
            (x * 255 / size.width as usize) as u8,
            (y * 255 / size.height as usize) as u8,
            shade,
            255,
        ]);
    }
    Ok(frame)
}

fn encode_frame(
    frame: &RgbaBuffer,
    format: ImageFormat,
    packer: &ImagePacker,
) -> Result<Vec<u8>, Error> {
    match format {
        ImageFormat::YCbCr422Sp => convert::rgba_to_ycbcr422sp(frame),
        ImageFormat::Jpeg => {
            let opts = InitializationOptions::new(frame.width, frame.height, PixelFormat::Rgba8888)
                .editable(true);
            let map = PixelMap::new(opts)?;
            map.write_from_buffer(&frame.data)?;
            let jpeg = packer.pack(&map, &PackingOption::new("image/jpeg", 95))?;
            map.release()?;
            Ok(jpeg)
        }
    }
}

/// Pushes `frames` synthetic frames into the surface, retrying while the
/// receiver is full.
fn produce(surface_id: String, frames: usize, fps: u32, format: ImageFormat) -> Result<(), Error> {
    let _span = info_span!("producer", surface = %surface_id).entered();
    let surface = ProducerSurface::lookup(&surface_id)?;
    let size = surface.size()?;
    let packer = create_image_packer();
    let period = Duration::from_secs(1) / fps.max(1);

    for n in 0..frames {
        let frame = encode_frame(&synthetic_frame(size, n)?, format, &packer)?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|ts| ts.as_nanos() as i64)
            .unwrap_or_default();
        loop {
            match surface.queue_frame(frame.clone(), timestamp) {
                Ok(()) => break,
                Err(Error::QueueFull { .. }) => thread::sleep(period / 4),
                Err(err) => return Err(err),
            }
        }
        debug!("queued frame {n}");
        thread::sleep(period);
    }
    Ok(())
}

async fn receive(opts: ReceiveOptions) -> Result<(), Box<dyn StdError>> {
    fs::create_dir_all(&opts.output)?;
    let format = ImageFormat::from(opts.format);
    let receiver = create_image_receiver(
        opts.size.width,
        opts.size.height,
        format.raw(),
        opts.capacity,
    )?;
    let surface_id = receiver.receiving_surface_id()?;
    info!("receiving {} {format} on surface {surface_id}", opts.size);

    let (tx, rx) = kanal::bounded(opts.frames.max(1));
    receiver.on(ReceiverEvent::ImageArrival, move || {
        if !matches!(tx.try_send(()), Ok(true)) {
            warn!("arrival notification dropped");
        }
    })?;

    let (frames, fps) = (opts.frames, opts.fps);
    let producer = thread::Builder::new()
        .name("producer".to_string())
        .spawn(move || produce(surface_id, frames, fps, format))?;

    let rx = rx.to_async();
    let packer = create_image_packer();
    let packing = PackingOption::new("image/jpeg", opts.quality);
    let mut stored = 0;
    for _ in 0..opts.frames {
        rx.recv().await?;
        let image = if opts.latest {
            match receiver.try_read_latest_image() {
                Ok(image) => image,
                // an earlier latest read already consumed this arrival
                Err(Error::QueueEmpty) => continue,
                Err(err) => return Err(err.into()),
            }
        } else {
            receiver.read_next_image().await?
        };

        let map = image.to_pixel_map_async().await?;
        let timestamp = image.timestamp();
        image.release()?;
        let jpeg = packer.pack_async(map.clone(), packing.clone()).await?;
        map.release()?;

        let path = opts.output.join(format!("frame-{timestamp}.jpg"));
        fs::write(&path, &jpeg)?;
        stored += 1;
        debug!("stored {} ({} bytes)", path.display(), jpeg.len());
    }

    match producer.join() {
        Ok(result) => result?,
        Err(_) => return Err("producer thread panicked".into()),
    }
    receiver.release()?;
    info!("stored {stored} of {} frames in {}", opts.frames, opts.output.display());
    Ok(())
}
