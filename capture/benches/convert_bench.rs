use criterion::{black_box, criterion_group, criterion_main, Criterion};
use facecap_capture::{
    CaptureSource, FrameConverter, PixelFormat, RgbaConverter, TestPatternSource,
    convert::yuyv_to_rgba,
};

fn bench_convert_formats(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_640x480");
    for format in [PixelFormat::Rgba, PixelFormat::Rgb24, PixelFormat::Bgr24, PixelFormat::Yuyv] {
        let mut source = TestPatternSource::new(640, 480, format).unwrap();
        let raw = source.get_frame().unwrap();
        let mut conv = RgbaConverter::for_frame(&raw);
        group.bench_function(format.to_string(), |b| {
            b.iter(|| {
                let out = conv.convert(black_box(&raw)).unwrap();
                black_box(out.data.len());
            });
        });
    }
    group.finish();
}

fn bench_yuyv_row(c: &mut Criterion) {
    let src: Vec<u8> = (0..1280u32 * 2).map(|i| (i % 256) as u8).collect();
    let mut dst = vec![0u8; 1280 * 4];
    c.bench_function("yuyv_to_rgba_1280", |b| {
        b.iter(|| yuyv_to_rgba(black_box(&src), black_box(&mut dst)));
    });
}

criterion_group!(benches, bench_convert_formats, bench_yuyv_row);
criterion_main!(benches);
