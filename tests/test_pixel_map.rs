// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_image::{
    create_pixel_map, create_pixel_map_from_colors, AlphaType, Error as ImageError,
    InitializationOptions, PixelFormat, PixelMap, PositionArea, Region, Size,
};
use std::{error::Error, sync::mpsc, time::Duration};

#[test]
fn test_4x4_region_scenario() -> Result<(), Box<dyn Error>> {
    let map = PixelMap::new(InitializationOptions::new(4, 4, PixelFormat::Rgba8888).editable(true))?;
    assert_eq!(map.byte_count()?, 64);

    let region = Region::new(1, 1, 2, 2);
    let pattern: Vec<u8> = (1..=16).collect();
    map.write_region(&region, &pattern)?;
    assert_eq!(map.read_region(&region)?, pattern);

    let mut full = vec![0xaa; 64];
    map.read_to_buffer(&mut full)?;
    let mut written = 0;
    for (i, px) in full.chunks_exact(4).enumerate() {
        let (x, y) = (i % 4, i / 4);
        if (1..3).contains(&x) && (1..3).contains(&y) {
            written += 1;
        } else {
            assert_eq!(px, [0, 0, 0, 0], "pixel ({x}, {y}) changed");
        }
    }
    assert_eq!(written, 4);

    Ok(())
}

#[test]
fn test_allocate_then_info() -> Result<(), Box<dyn Error>> {
    for (format, bpp) in [
        (PixelFormat::Argb8888, 4),
        (PixelFormat::Rgb565, 2),
        (PixelFormat::Rgba8888, 4),
        (PixelFormat::Bgra8888, 4),
        (PixelFormat::Rgb888, 3),
        (PixelFormat::Alpha8, 1),
    ] {
        let map = PixelMap::new(InitializationOptions::new(7, 3, format))?;
        let info = map.info()?;
        assert_eq!(info.size, Size::new(7, 3));
        assert_eq!(info.pixel_format, format);
        assert_eq!(map.bytes_per_row()?, 7 * bpp);
        assert_eq!(map.byte_count()?, 21 * bpp);
        println!("{map}");
    }

    let rgb = PixelMap::new(InitializationOptions::new(2, 2, PixelFormat::Rgb888))?;
    assert_eq!(rgb.info()?.alpha_type, AlphaType::Opaque);
    Ok(())
}

#[test]
fn test_invalid_allocation() {
    assert!(matches!(
        PixelMap::new(InitializationOptions::new(0, 4, PixelFormat::Rgba8888)),
        Err(ImageError::InvalidArgument(_))
    ));
    assert!(matches!(
        PixelMap::new(InitializationOptions::new(4, 4, PixelFormat::Unknown)),
        Err(ImageError::InvalidArgument(_))
    ));
    assert!(matches!(
        PixelMap::new(InitializationOptions::new(100_000, 100_000, PixelFormat::Rgba8888)),
        Err(ImageError::InvalidArgument(_))
    ));
}

#[test]
fn test_out_of_bounds_never_applies() -> Result<(), Box<dyn Error>> {
    let map = PixelMap::new(InitializationOptions::new(4, 4, PixelFormat::Rgba8888).editable(true))?;
    for region in [
        Region::new(3, 3, 2, 2),
        Region::new(-1, 0, 2, 2),
        Region::new(0, 4, 1, 1),
        Region::new(0, 0, 5, 1),
    ] {
        assert!(
            matches!(map.write_region(&region, &[0xff; 100]), Err(ImageError::OutOfRange(_))),
            "write {region} accepted"
        );
        assert!(matches!(map.read_region(&region), Err(ImageError::OutOfRange(_))));
    }
    assert_eq!(map.read_region(&Region::full(Size::new(4, 4)))?, vec![0; 64]);
    assert!(matches!(map.pixel_argb(4, 0), Err(ImageError::OutOfRange(_))));
    Ok(())
}

#[test]
fn test_not_editable() -> Result<(), Box<dyn Error>> {
    let map = PixelMap::new(InitializationOptions::new(2, 2, PixelFormat::Rgba8888))?;
    assert!(!map.is_editable()?);
    assert!(matches!(
        map.write_region(&Region::new(0, 0, 1, 1), &[1, 2, 3, 4]),
        Err(ImageError::NotEditable)
    ));
    assert!(matches!(map.fill(0xffffffff), Err(ImageError::NotEditable)));
    assert!(matches!(map.write_from_buffer(&[0; 16]), Err(ImageError::NotEditable)));
    Ok(())
}

#[test]
fn test_release() -> Result<(), Box<dyn Error>> {
    let map = PixelMap::new(InitializationOptions::new(2, 2, PixelFormat::Rgba8888))?;
    let clone = map.clone();
    map.release()?;
    assert!(map.is_released());
    assert!(matches!(map.release(), Err(ImageError::AlreadyReleased)));
    assert!(matches!(clone.info(), Err(ImageError::AlreadyReleased)));
    assert!(matches!(
        clone.read_region(&Region::new(0, 0, 1, 1)),
        Err(ImageError::AlreadyReleased)
    ));
    Ok(())
}

#[test]
fn test_position_area() -> Result<(), Box<dyn Error>> {
    let map = PixelMap::new(InitializationOptions::new(4, 4, PixelFormat::Rgb565).editable(true))?;
    let region = Region::new(2, 1, 2, 3);

    let mut area = PositionArea::new(region, PixelFormat::Rgb565);
    area.offset = 2;
    area.stride = 6;
    area.pixels = vec![0; 2 + 6 * 3];
    for (i, byte) in area.pixels.iter_mut().enumerate().skip(2) {
        *byte = i as u8;
    }
    map.write_pixels(&area)?;

    let mut back = PositionArea::new(region, PixelFormat::Rgb565);
    map.read_pixels(&mut back)?;
    let expected: Vec<u8> = (0..3)
        .flat_map(|y| area.pixels[2 + y * 6..2 + y * 6 + 4].to_vec())
        .collect();
    assert_eq!(back.pixels, expected);

    let mut short = PositionArea::new(region, PixelFormat::Rgb565);
    short.pixels.truncate(5);
    assert!(matches!(
        map.read_pixels(&mut short),
        Err(ImageError::BufferTooSmall { .. })
    ));

    // geometry that would overflow the address space is refused
    let mut huge_stride = PositionArea::new(region, PixelFormat::Rgb565);
    huge_stride.stride = usize::MAX;
    assert!(matches!(
        map.read_pixels(&mut huge_stride),
        Err(ImageError::BufferTooSmall { .. })
    ));
    let mut huge_offset = PositionArea::new(region, PixelFormat::Rgb565);
    huge_offset.offset = usize::MAX;
    assert!(matches!(
        map.write_pixels(&huge_offset),
        Err(ImageError::BufferTooSmall { .. })
    ));
    // nothing was written by the refused calls
    map.read_pixels(&mut back)?;
    assert_eq!(back.pixels, expected);
    Ok(())
}

#[test]
fn test_colors_are_bgra() -> Result<(), Box<dyn Error>> {
    let colors = [1, 2, 3, 255, 10, 20, 30, 255];
    let map = PixelMap::from_colors(&colors, InitializationOptions::new(2, 1, PixelFormat::Rgba8888))?;
    assert_eq!(map.read_region(&Region::new(0, 0, 2, 1))?, vec![3, 2, 1, 255, 30, 20, 10, 255]);
    assert_eq!(map.pixel_argb(1, 0)?, 0xff1e140a);

    assert!(matches!(
        PixelMap::from_colors(&colors, InitializationOptions::new(2, 2, PixelFormat::Rgba8888)),
        Err(ImageError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn test_pixels_and_fill() -> Result<(), Box<dyn Error>> {
    let map = PixelMap::new(InitializationOptions::new(3, 2, PixelFormat::Argb8888).editable(true))?;
    map.fill(0x80102030)?;
    assert_eq!(map.read_region(&Region::new(2, 1, 1, 1))?, vec![0x80, 0x10, 0x20, 0x30]);
    map.write_pixel(0, 0, 0xff00ff00)?;
    assert_eq!(map.pixel_argb(0, 0)?, 0xff00ff00);
    assert_eq!(map.pixel_argb(1, 0)?, 0x80102030);

    let rgb565 = PixelMap::new(InitializationOptions::new(1, 1, PixelFormat::Rgb565).editable(true))?;
    rgb565.write_pixel(0, 0, 0xffff0000)?;
    assert_eq!(rgb565.read_region(&Region::new(0, 0, 1, 1))?, vec![0x00, 0xf8]);
    assert_eq!(rgb565.pixel_argb(0, 0)?, 0xffff0000);
    Ok(())
}

#[test]
fn test_premultiply() -> Result<(), Box<dyn Error>> {
    let map = PixelMap::new(InitializationOptions::new(1, 1, PixelFormat::Rgba8888).editable(true))?;
    map.write_region(&Region::new(0, 0, 1, 1), &[200, 100, 50, 128])?;
    assert_eq!(map.info()?.alpha_type, AlphaType::Unpremul);

    map.set_alpha_type(AlphaType::Premul)?;
    assert_eq!(map.info()?.alpha_type, AlphaType::Premul);
    assert_eq!(map.read_region(&Region::new(0, 0, 1, 1))?, vec![100, 50, 25, 128]);

    let rgb = PixelMap::new(InitializationOptions::new(1, 1, PixelFormat::Rgb888))?;
    assert!(matches!(
        rgb.set_alpha_type(AlphaType::Premul),
        Err(ImageError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn test_create_from() -> Result<(), Box<dyn Error>> {
    let src = PixelMap::new(InitializationOptions::new(4, 4, PixelFormat::Rgba8888).editable(true))?;
    src.write_pixel(2, 2, 0xff112233)?;

    let copy = PixelMap::create_from(
        &src,
        Some(Region::new(2, 2, 2, 2)),
        InitializationOptions::new(0, 0, PixelFormat::Rgb888),
    )?;
    assert_eq!(copy.size()?, Size::new(2, 2));
    assert_eq!(copy.pixel_format()?, PixelFormat::Rgb888);
    assert_eq!(copy.pixel_argb(0, 0)?, 0xff112233);

    let scaled = PixelMap::create_from(
        &src,
        None,
        InitializationOptions::new(8, 8, PixelFormat::Unknown),
    )?;
    assert_eq!(scaled.size()?, Size::new(8, 8));
    assert_eq!(scaled.pixel_format()?, PixelFormat::Rgba8888);
    assert_eq!(scaled.pixel_argb(5, 5)?, 0xff112233);

    assert!(matches!(
        PixelMap::create_from(
            &src,
            Some(Region::new(3, 3, 2, 2)),
            InitializationOptions::new(0, 0, PixelFormat::Unknown),
        ),
        Err(ImageError::OutOfRange(_))
    ));
    Ok(())
}

#[test]
fn test_completion_callback() -> Result<(), Box<dyn Error>> {
    let opts = InitializationOptions::new(2, 2, PixelFormat::Bgra8888).editable(true);
    let map = create_pixel_map(opts).wait()?;

    let (tx, rx) = mpsc::channel();
    map.read_region_async(Region::new(0, 0, 3, 1))
        .on_complete(move |result| {
            let _ = tx.send(result);
        });
    let result = rx.recv_timeout(Duration::from_secs(5))?;
    assert!(matches!(result, Err(ImageError::OutOfRange(_))));

    let colors = vec![0xff; 16];
    let white = create_pixel_map_from_colors(
        colors,
        InitializationOptions::new(2, 2, PixelFormat::Unknown),
    )
    .wait()?;
    assert_eq!(white.pixel_format()?, PixelFormat::Rgba8888);

    let defaulted = create_pixel_map(InitializationOptions::new(2, 2, PixelFormat::Unknown)).wait()?;
    assert_eq!(defaulted.pixel_format()?, PixelFormat::Rgba8888);
    Ok(())
}

#[tokio::test]
async fn test_wait_on_current_thread_runtime() -> Result<(), Box<dyn Error>> {
    let opts = InitializationOptions::new(2, 2, PixelFormat::Rgba8888);
    assert!(matches!(
        create_pixel_map(opts).wait(),
        Err(ImageError::InvalidArgument(_))
    ));
    assert_eq!(create_pixel_map(opts).await?.size()?, Size::new(2, 2));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_on_multi_thread_runtime() -> Result<(), Box<dyn Error>> {
    let opts = InitializationOptions::new(2, 2, PixelFormat::Rgba8888);
    let map = create_pixel_map(opts).wait()?;
    assert_eq!(map.size()?, Size::new(2, 2));
    Ok(())
}

#[tokio::test]
async fn test_async_forms() -> Result<(), Box<dyn Error>> {
    let opts = InitializationOptions::new(4, 2, PixelFormat::Rgba8888).editable(true);
    let map = create_pixel_map(opts).await?;

    let region = Region::new(1, 0, 2, 2);
    map.write_region_async(region, vec![7; 16]).await?;
    assert_eq!(map.read_region_async(region).await?, vec![7; 16]);

    let buffer = map.read_to_buffer_async(vec![0; 32]).await?;
    assert_eq!(buffer.iter().filter(|b| **b == 7).count(), 16);

    let info = map.info_async().await?;
    assert_eq!(info.size, Size::new(4, 2));

    map.release_async().await?;
    assert!(matches!(
        map.release_async().await,
        Err(ImageError::AlreadyReleased)
    ));
    Ok(())
}
