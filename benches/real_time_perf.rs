// Benchmark for the two real-time hot paths: DDA tick and segment-prep.
// Both run on dedicated periodic threads in `printer.rs`, so their
// per-call cost bounds how short `dda_tick_period`/`segment_time` can be
// configured. Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use motionctl::axes::{Axis, AxisVector};
use motionctl::config::Config;
use motionctl::gcode::{LinePrimitive, MotionMode, MotionSink};
use motionctl::motion::MotionController;

fn bench_config() -> Config {
    let mut config = Config::default();
    config.motors[0].axis = Some(Axis::X);
    config.motors[1].axis = Some(Axis::Y);
    config.motors[2].axis = Some(Axis::Z);
    for axis in config.axes.iter_mut() {
        axis.velocity_max = 600.0;
        axis.feedrate_max = 600.0;
        axis.jerk_max = 20_000_000.0;
    }
    config.system.segment_time = 0.001;
    config.system.dda_tick_period = 0.00002;
    config
}

fn loaded_motion(config: &Config) -> MotionController {
    let mut motion = MotionController::new(config);
    motion
        .accept_line(LinePrimitive {
            line_no: 1,
            target: AxisVector::from([500.0, 500.0, 10.0, 0.0, 0.0, 0.0]),
            feed_rate: 600.0,
            motion_mode: MotionMode::Feed,
            modal: Default::default(),
        })
        .unwrap();
    motion
}

fn bench_dda_tick(c: &mut Criterion) {
    let config = bench_config();
    let mut motion = loaded_motion(&config);
    motion.prepare_segment();

    c.bench_function("single DDA tick", |b| {
        b.iter(|| {
            motion.tick();
        });
    });
}

fn bench_segment_prepare(c: &mut Criterion) {
    let config = bench_config();

    c.bench_function("single prepare_segment call", |b| {
        b.iter_batched(
            || loaded_motion(&config),
            |mut motion| {
                motion.prepare_segment();
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_full_move_real_time_cost(c: &mut Criterion) {
    let config = bench_config();

    c.bench_function("prepare+tick a whole 500mm move", |b| {
        b.iter_batched(
            || loaded_motion(&config),
            |mut motion| {
                let mut guard = 0;
                loop {
                    let freed = motion.prepare_segment();
                    for _ in 0..motion.dda_ticks_per_segment() {
                        motion.tick();
                    }
                    if freed && motion.queue().is_empty() {
                        break;
                    }
                    guard += 1;
                    if guard > 2_000_000 {
                        break;
                    }
                }
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_dda_tick, bench_segment_prepare, bench_full_move_real_time_cost);
criterion_main!(benches);
