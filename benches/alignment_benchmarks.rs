//! Benchmarks for frame mapping, sampling, and planning.
//!
//! Run with: cargo bench
//!
//! The decode benchmark requires fixture files from
//! `tests/fixtures/generate_fixtures.sh`.

use std::{hint::black_box, path::Path};

use criterion::Criterion;
use shotalign::{
    FfmpegDecoder, FfmpegLogLevel, FrameMapping, FrameSet, FrameSetGenerator, ReconcilerSet,
    SamplingJob, SamplingOptions, VideoSource, expand_window, parse_screenshot_file_name,
    plan_source_tasks, reconstruct_from_listing, screenshot_file_name,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

fn benchmark_mapping(criterion: &mut Criterion) {
    let mapping = FrameMapping::from_clock_rates("DVD", 25.0, 29.97, 332).unwrap();

    criterion.bench_function("map 10k reference frames", |bencher| {
        bencher.iter(|| {
            for reference_frame in 0..10_000_u64 {
                black_box(mapping.map(black_box(reference_frame)));
            }
        });
    });

    criterion.bench_function("expand window (tolerance 5)", |bencher| {
        bencher.iter(|| expand_window(black_box(63_851), black_box(5), black_box(180_000)));
    });
}

fn benchmark_sampling(criterion: &mut Criterion) {
    criterion.bench_function("sample 100 of 200k frames", |bencher| {
        let mut generator = FrameSetGenerator::with_seed(7);
        bencher.iter(|| generator.generate(black_box(200_000), 100, 0, 0).unwrap());
    });

    criterion.bench_function("saturating sample", |bencher| {
        let mut generator = FrameSetGenerator::with_seed(7);
        bencher.iter(|| generator.generate(black_box(1_000), 5_000, 0, 0).unwrap());
    });
}

fn benchmark_planning(criterion: &mut Criterion) {
    let source = VideoSource::new("dvd.mkv")
        .with_identity("DVD")
        .with_source_fps(29.97)
        .with_offset_frames(332)
        .with_tolerance_frames(3);
    let mapping = FrameMapping::for_source(&source, 29.97).unwrap();
    let frame_set = FrameSetGenerator::with_seed(3).generate(150_000, 500, 0, 0).unwrap();

    criterion.bench_function("plan 500 reference frames", |bencher| {
        bencher.iter(|| plan_source_tasks(0, &source, &mapping, 180_000, black_box(&frame_set)));
    });
}

fn benchmark_history_names(criterion: &mut Criterion) {
    let names: Vec<String> = (0..2_000_u64)
        .map(|index| screenshot_file_name(index * 37, index * 44, "Remaster 2019.mkv", "png"))
        .collect();

    criterion.bench_function("parse screenshot names", |bencher| {
        bencher.iter(|| {
            for name in &names {
                let _ = black_box(parse_screenshot_file_name(name));
            }
        });
    });

    criterion.bench_function("reconstruct run from 2k names", |bencher| {
        bencher.iter(|| reconstruct_from_listing("20240101_000000", black_box(&names)));
    });
}

fn benchmark_decode(criterion: &mut Criterion) {
    shotalign::set_ffmpeg_log_level(FfmpegLogLevel::Error);

    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    let directory = tempfile::tempdir().unwrap();
    let sources = vec![VideoSource::new(SAMPLE_VIDEO).with_tolerance_frames(1)];
    let frame_set = FrameSet::from_frames(vec![10, 75, 200]);
    let job = SamplingJob::new(
        FfmpegDecoder,
        ReconcilerSet::standard(),
        SamplingOptions::new().with_overwrite(true),
    );

    criterion.bench_function("run 3 reference frames (tolerance 1)", |bencher| {
        bencher.iter(|| job.run(&sources, &frame_set, directory.path()).unwrap());
    });
}

criterion::criterion_group!(
    benches,
    benchmark_mapping,
    benchmark_sampling,
    benchmark_planning,
    benchmark_history_names,
    benchmark_decode,
);
criterion::criterion_main!(benches);
