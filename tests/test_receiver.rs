// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_image::{
    create_image_packer, create_image_receiver, ComponentType, Error as ImageError,
    ImageFormat, ImageReceiver, InitializationOptions, PackingOption, PixelFormat, PixelMap,
    ProducerSurface, ReceiverEvent, ReceiverState, Region, Size,
};
use serial_test::serial;
use std::{
    error::Error,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

const YCBCR: i32 = 1000;
const JPEG: i32 = 2000;

/// Uniform frame with luma `level` and neutral chroma.
fn gray(size: Size, level: u8) -> Vec<u8> {
    let luma = size.width as usize * size.height as usize;
    let mut frame = vec![level; luma];
    frame.resize(luma * 2, 128);
    frame
}

fn armed(
    width: u32,
    height: u32,
    format: i32,
    capacity: usize,
) -> Result<(ImageReceiver, ProducerSurface), Box<dyn Error>> {
    let receiver = create_image_receiver(width, height, format, capacity)?;
    let surface = ProducerSurface::lookup(&receiver.receiving_surface_id()?)?;
    Ok((receiver, surface))
}

#[test]
#[serial]
fn test_fifo_order() -> Result<(), Box<dyn Error>> {
    let size = Size::new(4, 2);
    let (receiver, surface) = armed(4, 2, YCBCR, 4)?;
    for ts in 1..=4 {
        surface.queue_frame(gray(size, ts as u8 * 10), ts)?;
    }
    assert_eq!(receiver.state(), ReceiverState::Receiving);

    for ts in 1..=4 {
        let image = receiver.try_read_next_image()?;
        assert_eq!(receiver.state(), ReceiverState::Draining);
        assert_eq!(image.timestamp(), ts);
        assert_eq!(image.size(), size);
        assert_eq!(image.format(), ImageFormat::YCbCr422Sp);
        image.release()?;
        assert_eq!(receiver.state(), ReceiverState::Receiving);
    }
    assert!(matches!(
        receiver.try_read_next_image(),
        Err(ImageError::QueueEmpty)
    ));
    assert!(matches!(
        receiver.try_read_latest_image(),
        Err(ImageError::QueueEmpty)
    ));
    assert_eq!(receiver.outstanding(), 0);
    receiver.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_latest_wins() -> Result<(), Box<dyn Error>> {
    let (receiver, surface) = armed(4, 2, YCBCR, 3)?;
    for ts in 1..=3 {
        surface.queue_frame(gray(Size::new(4, 2), 0), ts)?;
    }
    assert_eq!(receiver.outstanding(), 3);

    let latest = receiver.try_read_latest_image()?;
    assert_eq!(latest.timestamp(), 3);
    // the two older frames were released with the read
    assert_eq!(receiver.outstanding(), 1);
    assert!(matches!(
        receiver.try_read_next_image(),
        Err(ImageError::QueueEmpty)
    ));
    latest.release()?;
    assert_eq!(receiver.outstanding(), 0);
    receiver.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_capacity() -> Result<(), Box<dyn Error>> {
    let size = Size::new(2, 2);
    let (receiver, surface) = armed(2, 2, YCBCR, 2)?;
    surface.queue_frame(gray(size, 1), 1)?;
    surface.queue_frame(gray(size, 2), 2)?;
    assert!(matches!(
        surface.queue_frame(gray(size, 3), 3),
        Err(ImageError::QueueFull { capacity: 2 })
    ));

    // reading does not free a slot, releasing the image does
    let first = receiver.try_read_next_image()?;
    assert!(matches!(
        surface.queue_frame(gray(size, 3), 3),
        Err(ImageError::QueueFull { .. })
    ));
    first.release()?;
    assert!(matches!(first.release(), Err(ImageError::AlreadyReleased)));
    surface.queue_frame(gray(size, 3), 3)?;
    assert!(matches!(
        surface.queue_frame(gray(size, 4), 4),
        Err(ImageError::QueueFull { .. })
    ));

    // dropping an unreleased image returns its slot too
    drop(receiver.try_read_next_image()?);
    surface.queue_frame(gray(size, 4), 4)?;
    assert_eq!(receiver.outstanding(), 2);
    receiver.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_arrival_callback() -> Result<(), Box<dyn Error>> {
    let size = Size::new(2, 2);
    let (receiver, surface) = armed(2, 2, YCBCR, 8)?;

    let first = Arc::new(AtomicUsize::new(0));
    let counter = first.clone();
    receiver.on(ReceiverEvent::ImageArrival, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })?;
    surface.queue_frame(gray(size, 0), 1)?;

    let (tx, rx) = mpsc::channel();
    receiver.on("imageArrival".parse()?, move || {
        let _ = tx.send(thread::current().id());
    })?;
    surface.queue_frame(gray(size, 0), 2)?;
    surface.queue_frame(gray(size, 0), 3)?;

    assert_eq!(first.load(Ordering::SeqCst), 1);
    // the handler runs on the producer's thread
    assert_eq!(rx.recv_timeout(Duration::from_secs(1))?, thread::current().id());
    assert_eq!(rx.try_iter().count(), 1);
    receiver.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_malformed_frames() -> Result<(), Box<dyn Error>> {
    let (receiver, surface) = armed(4, 4, YCBCR, 2)?;
    assert!(matches!(
        surface.queue_frame(vec![0; 31], 0),
        Err(ImageError::InvalidArgument(_))
    ));
    assert!(matches!(
        surface.queue_frame(vec![0; 33], 0),
        Err(ImageError::InvalidArgument(_))
    ));
    assert_eq!(receiver.outstanding(), 0);

    let (jpeg_receiver, jpeg_surface) = armed(4, 4, JPEG, 2)?;
    assert!(matches!(
        jpeg_surface.queue_frame(Vec::new(), 0),
        Err(ImageError::InvalidArgument(_))
    ));

    assert!(matches!(
        create_image_receiver(4, 4, 1234, 2),
        Err(ImageError::InvalidArgument(_))
    ));
    assert!(matches!(
        create_image_receiver(4, 4, YCBCR, 0),
        Err(ImageError::InvalidArgument(_))
    ));
    assert!(matches!(
        create_image_receiver(0, 4, JPEG, 1),
        Err(ImageError::InvalidArgument(_))
    ));
    assert!(ProducerSurface::lookup("no-such-surface").is_err());

    receiver.release()?;
    jpeg_receiver.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_ycbcr_image() -> Result<(), Box<dyn Error>> {
    let size = Size::new(4, 2);
    let (receiver, surface) = armed(4, 2, YCBCR, 1)?;
    surface.queue_frame(gray(size, 90), 5)?;
    let image = receiver.try_read_next_image()?;

    let y = image.component(ComponentType::YuvY)?;
    assert_eq!((y.row_stride, y.pixel_stride), (4, 1));
    assert_eq!(y.bytes, vec![90; 8]);
    let u = image.component(ComponentType::YuvU)?;
    assert_eq!((u.row_stride, u.pixel_stride), (4, 2));
    assert_eq!(u.bytes.len(), 8);
    let v = image.component(ComponentType::YuvV)?;
    assert_eq!(v.bytes.len(), 7);

    let map = image.to_pixel_map()?;
    assert_eq!(map.size()?, size);
    assert_eq!(map.pixel_format()?, PixelFormat::Rgba8888);
    assert_eq!(map.pixel_argb(3, 1)?, 0xff5a5a5a);

    assert_eq!(image.clip_rect(), Region::full(size));
    assert!(matches!(
        image.set_clip_rect(Region::new(2, 0, 4, 2)),
        Err(ImageError::OutOfRange(_))
    ));
    image.set_clip_rect(Region::new(2, 0, 2, 1))?;
    assert_eq!(image.to_pixel_map()?.size()?, Size::new(2, 1));

    image.release()?;
    assert!(matches!(
        image.component(ComponentType::YuvY),
        Err(ImageError::AlreadyReleased)
    ));
    assert!(matches!(image.to_pixel_map(), Err(ImageError::AlreadyReleased)));
    receiver.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_jpeg_image() -> Result<(), Box<dyn Error>> {
    let map = PixelMap::new(InitializationOptions::new(16, 8, PixelFormat::Rgba8888))?;
    let jpeg = create_image_packer().pack(&map, &PackingOption::new("image/jpeg", 90))?;

    let (receiver, surface) = armed(16, 8, JPEG, 1)?;
    surface.queue_frame(jpeg.clone(), 1)?;
    let image = receiver.try_read_latest_image()?;

    let component = image.component(ComponentType::Jpeg)?;
    assert_eq!(component.bytes, jpeg);
    assert!(matches!(
        image.component(ComponentType::YuvY),
        Err(ImageError::InvalidArgument(_))
    ));

    image.set_clip_rect(Region::new(0, 0, 8, 8))?;
    let decoded = image.to_pixel_map()?;
    assert_eq!(decoded.size()?, Size::new(8, 8));
    receiver.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_release_receiver() -> Result<(), Box<dyn Error>> {
    let size = Size::new(2, 2);
    let (receiver, surface) = armed(2, 2, YCBCR, 4)?;
    let id = surface.id().to_string();
    surface.queue_frame(gray(size, 0), 1)?;
    surface.queue_frame(gray(size, 0), 2)?;
    let held = receiver.try_read_next_image()?;

    receiver.release()?;
    assert_eq!(receiver.state(), ReceiverState::Released);
    assert!(matches!(receiver.release(), Err(ImageError::AlreadyReleased)));
    assert!(matches!(
        receiver.try_read_next_image(),
        Err(ImageError::AlreadyReleased)
    ));
    assert!(matches!(
        receiver.receiving_surface_id(),
        Err(ImageError::AlreadyReleased)
    ));
    assert!(ProducerSurface::lookup(&id).is_err());
    assert!(matches!(
        surface.queue_frame(gray(size, 0), 3),
        Err(ImageError::AlreadyReleased)
    ));

    // images read before the release stay usable
    assert_eq!(held.to_pixel_map()?.size()?, size);
    held.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_drop_receiver() -> Result<(), Box<dyn Error>> {
    let size = Size::new(2, 2);
    let (receiver, surface) = armed(2, 2, YCBCR, 4)?;
    let id = surface.id().to_string();
    surface.queue_frame(gray(size, 0), 1)?;
    surface.queue_frame(gray(size, 0), 2)?;
    let held = receiver.try_read_next_image()?;

    let other = receiver.clone();
    drop(receiver);
    // any remaining handle keeps the surface open
    assert_eq!(ProducerSurface::lookup(&id)?.id(), id);
    drop(other);

    // an image still held does not keep the surface registered
    assert!(ProducerSurface::lookup(&id).is_err());
    assert!(matches!(
        surface.queue_frame(gray(size, 0), 3),
        Err(ImageError::AlreadyReleased)
    ));
    assert_eq!(held.to_pixel_map()?.size()?, size);
    held.release()?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_drop_receiver_fails_pending_read() -> Result<(), Box<dyn Error>> {
    let (receiver, _surface) = armed(2, 2, YCBCR, 1)?;
    let pending = receiver.read_next_image();
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(receiver);
    let result = tokio::time::timeout(Duration::from_secs(5), pending).await?;
    assert!(matches!(result, Err(ImageError::AlreadyReleased)));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_read_waits_for_arrival() -> Result<(), Box<dyn Error>> {
    let size = Size::new(2, 2);
    let (receiver, surface) = armed(2, 2, YCBCR, 2)?;
    let pending = receiver.read_next_image();

    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        surface.queue_frame(gray(size, 0), 42)
    });
    let image = tokio::time::timeout(Duration::from_secs(5), pending).await??;
    assert_eq!(image.timestamp(), 42);
    producer.join().map_err(|_| "producer panicked")??;

    // nothing queued: a further read stays pending
    let stale = tokio::time::timeout(Duration::from_millis(50), receiver.read_next_image()).await;
    assert!(stale.is_err());

    let waiting = receiver.read_latest_image();
    tokio::time::sleep(Duration::from_millis(20)).await;
    receiver.release_async().await?;
    let released = tokio::time::timeout(Duration::from_secs(5), waiting).await?;
    assert!(matches!(released, Err(ImageError::AlreadyReleased)));
    Ok(())
}
