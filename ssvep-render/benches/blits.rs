use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pprof::criterion::{Output, PProfProfiler};
use std::time::Duration;

use ssvep_render::{CacheIndex, SkiaRenderer, StimulusLayout};

fn prepare_renderer(width: u32, height: u32, layout: StimulusLayout) -> SkiaRenderer {
    let mut r = SkiaRenderer::new(width, height, layout).expect("renderer");
    let center = (width as f32 * 0.5, height as f32 * 0.5);
    r.blit_cached(CacheIndex::SquareLit, center);
    r.blit_cached(CacheIndex::Fixation, center);
    r
}

/// Cost of the per-tick shape blits at full HD.
pub fn bench_blit_cached(c: &mut Criterion) {
    const WIDTH: u32 = 1920;
    const HEIGHT: u32 = 1080;
    let center = (960.0, 540.0);
    let mut group = c.benchmark_group("blit_cached");
    group
        .sample_size(50)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(2));

    group.bench_function("saccade_square", |b| {
        let mut renderer = prepare_renderer(WIDTH, HEIGHT, StimulusLayout::SACCADE);
        b.iter(|| renderer.blit_cached(CacheIndex::SquareLit, black_box(center)));
    });

    group.bench_function("gaze_shift_square_clipped", |b| {
        let mut renderer = prepare_renderer(WIDTH, HEIGHT, StimulusLayout::GAZE_SHIFT);
        b.iter(|| renderer.blit_cached(CacheIndex::SquareLit, black_box(center)));
    });

    group.bench_function("fixation_blend", |b| {
        let mut renderer = prepare_renderer(WIDTH, HEIGHT, StimulusLayout::SACCADE);
        b.iter(|| renderer.blit_cached(CacheIndex::Fixation, black_box(center)));
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
        .confidence_level(0.95)
        .noise_threshold(0.02)
        .significance_level(0.05);
    targets = bench_blit_cached
}

criterion_main!(benches);
