//! ABOUTME: Benchmarks for mask computation and both localization strategies
//! ABOUTME: Uses criterion across the frame sizes the pipeline is typically run at

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fw_vision::{compute_mask, BlobLocalizer, GridLocalizer};
use test_support::{gray_with_block, uniform_gray};

const FRAME_SIZES: [(u32, u32, &str); 3] = [
    (176, 120, "176x120"),
    (352, 240, "352x240"),
    (640, 480, "640x480"),
];

fn bench_compute_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_mask");

    for (width, height, size_name) in FRAME_SIZES {
        let background = uniform_gray(width, height, 50);
        let frame = gray_with_block(width, height, 50, width / 4, height / 4, 40, 40, 200);

        group.bench_with_input(
            BenchmarkId::from_parameter(size_name),
            &(frame, background),
            |b, (frame, background)| {
                b.iter(|| compute_mask(frame, background).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_localizers(c: &mut Criterion) {
    let blob = BlobLocalizer::new(40);
    let grid = GridLocalizer::new(40, 256.0);
    let mut group = c.benchmark_group("localizers");

    for (width, height, size_name) in FRAME_SIZES {
        // Two separate moving regions
        let mut mask = gray_with_block(width, height, 0, 10, 10, 30, 30, 180);
        for y in height / 2..height / 2 + 20 {
            for x in width / 2..width / 2 + 20 {
                mask.put_pixel(x, y, image::Luma([120]));
            }
        }

        group.bench_with_input(BenchmarkId::new("blob", size_name), &mask, |b, mask| {
            b.iter(|| blob.extract_blobs(mask));
        });
        group.bench_with_input(BenchmarkId::new("grid", size_name), &mask, |b, mask| {
            b.iter(|| grid.locate(mask));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compute_mask, bench_localizers);
criterion_main!(benches);
