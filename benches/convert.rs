use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_image::{
    convert::{self, RgbaBuffer, Rotation},
    AlphaType, PixelFormat, Size,
};

fn gradient(width: u32, height: u32) -> RgbaBuffer {
    let data = (0..width * height)
        .flat_map(|i| [(i % width) as u8, (i / width) as u8, 0x80, 0xff])
        .collect();
    RgbaBuffer::from_raw(width, height, data).unwrap()
}

pub fn benchmark_resize(c: &mut Criterion) {
    let dims = [(320, 240), (640, 480), (1280, 720), (1920, 1080)];

    let mut group = c.benchmark_group("resize");
    for src_dim in dims.iter() {
        let src = gradient(src_dim.0, src_dim.1);
        for dst_dim in dims.iter() {
            group.bench_with_input(
                format!("{}x{}-{}x{}", src_dim.0, src_dim.1, dst_dim.0, dst_dim.1),
                &src,
                |b, src| b.iter(|| convert::resize(src, Size::new(dst_dim.0, dst_dim.1))),
            );
        }
    }
    group.finish();
}

pub fn benchmark_rotate(c: &mut Criterion) {
    let src = gradient(1280, 720);
    let mut group = c.benchmark_group("rotate");
    for degrees in [90.0, 180.0, 270.0, 30.0] {
        let rotation = Rotation::from_degrees(degrees).unwrap();
        group.bench_with_input(format!("{degrees}"), &src, |b, src| {
            b.iter(|| convert::rotate(src, rotation).unwrap())
        });
    }
    group.finish();
}

pub fn benchmark_format(c: &mut Criterion) {
    let src = gradient(1920, 1080);
    let mut group = c.benchmark_group("format");
    for fmt in [
        PixelFormat::Rgb565,
        PixelFormat::Rgb888,
        PixelFormat::Bgra8888,
        PixelFormat::Alpha8,
    ] {
        let stride = 1920 * fmt.bytes_per_pixel();
        let packed = convert::from_rgba(&src, fmt, AlphaType::Unpremul, stride).unwrap();
        group.bench_with_input(format!("from_rgba/{fmt}"), &src, |b, src| {
            b.iter(|| convert::from_rgba(src, fmt, AlphaType::Unpremul, stride))
        });
        group.bench_with_input(format!("to_rgba/{fmt}"), &packed, |b, packed| {
            b.iter(|| convert::to_rgba(packed, stride, src.size(), fmt, AlphaType::Unpremul))
        });
    }

    let yuv = convert::rgba_to_ycbcr422sp(&src).unwrap();
    group.bench_with_input("ycbcr422sp_to_rgba", &yuv, |b, yuv| {
        b.iter(|| convert::ycbcr422sp_to_rgba(yuv, 1920, 1080))
    });
    group.finish();
}

criterion_group!(benches, benchmark_resize, benchmark_rotate, benchmark_format);
criterion_main!(benches);
