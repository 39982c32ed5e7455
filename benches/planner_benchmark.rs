// Benchmark for the g-code block parser and the look-ahead planner.
// Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use motionctl::axes::{Axis, AxisVector};
use motionctl::config::Config;
use motionctl::gcode::{CanonicalMachine, CommandPrimitive, DwellPrimitive, LinePrimitive, MotionMode, MotionSink};
use motionctl::motion::MotionController;

fn bench_config() -> Config {
    let mut config = Config::default();
    config.motors[0].axis = Some(Axis::X);
    config.motors[1].axis = Some(Axis::Y);
    for axis in config.axes.iter_mut() {
        axis.velocity_max = 600.0;
        axis.feedrate_max = 600.0;
        axis.jerk_max = 20_000_000.0;
    }
    config.system.planner_buffer_count = 64;
    config
}

struct NullSink;
impl MotionSink for NullSink {
    fn accept_line(&mut self, _line: LinePrimitive) -> motionctl::error::BlockResult {
        Ok(())
    }
    fn accept_dwell(&mut self, _dwell: DwellPrimitive) -> motionctl::error::BlockResult {
        Ok(())
    }
    fn accept_command(&mut self, _command: CommandPrimitive) -> motionctl::error::BlockResult {
        Ok(())
    }
}

fn bench_block_parsing(c: &mut Criterion) {
    let config = bench_config();
    let mut blocks = Vec::new();
    for i in 0..10_000 {
        blocks.push(format!("G1 X{} Y{} F600\n", i % 100, (i * 2) % 100));
    }
    let program = blocks.join("");

    c.bench_function("execute_block 10k G1 lines", |b| {
        b.iter(|| {
            let mut machine = CanonicalMachine::new(&config, NullSink);
            let mut line_no = 0u32;
            for line in program.lines() {
                line_no += 1;
                let _ = machine.execute_block(line, &config, line_no);
            }
        });
    });
}

fn bench_planner_replan(c: &mut Criterion) {
    let config = bench_config();

    c.bench_function("planner replan over a 64-segment zig-zag", |b| {
        b.iter(|| {
            let mut motion = MotionController::new(&config);
            for i in 0..64 {
                let x = (i % 2) as f64 * 10.0;
                let y = (i / 2) as f64 * 0.5;
                motion
                    .accept_line(LinePrimitive {
                        line_no: i as u32,
                        target: AxisVector::from([x, y, 0.0, 0.0, 0.0, 0.0]),
                        feed_rate: 600.0,
                        motion_mode: MotionMode::Feed,
                        modal: Default::default(),
                    })
                    .ok();
            }
        });
    });
}

fn bench_segment_drain(c: &mut Criterion) {
    let mut config = bench_config();
    config.system.segment_time = 0.001;
    config.system.dda_tick_period = 0.0001;

    c.bench_function("drain a single long move's segments", |b| {
        b.iter(|| {
            let mut motion = MotionController::new(&config);
            motion
                .accept_line(LinePrimitive {
                    line_no: 1,
                    target: AxisVector::from([200.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
                    feed_rate: 600.0,
                    motion_mode: MotionMode::Feed,
                    modal: Default::default(),
                })
                .unwrap();
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
                if guard > 1_000_000 {
                    break;
                }
            }
        });
    });
}

criterion_group!(benches, bench_block_parsing, bench_planner_replan, bench_segment_drain);
criterion_main!(benches);
