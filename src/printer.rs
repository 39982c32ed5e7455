//! Top-level orchestration: wires the canonical machine, the motion
//! pipeline, and the serial transport together, and runs the two
//! real-time contexts — segment-prep and stepper-tick — on dedicated
//! threads sleeping to a periodic deadline, standing in for timer ISRs.
//!
//! Grounded in the teacher's `Printer` (tokio-task orchestrator over
//! `Arc<RwLock<PrinterState>>`): the foreground shape survives, but the two
//! real-time contexts are pulled onto dedicated `std::thread` loops since
//! bounded-latency periodic work doesn't fit the tokio scheduler's
//! cooperative yields. Both threads share the motion pipeline behind one
//! `std::sync::Mutex` rather than the single-byte atomic a bare-metal
//! translation of the planner ring's state field would use — segment-prep
//! and stepper-tick both need coordinated mutable access to the whole
//! pipeline here, not just a state byte (see DESIGN.md).

use crate::config::Config;
use crate::error::{BlockResult, StatusCode};
use crate::gcode::{CanonicalMachine, CommandPrimitive, DwellPrimitive, LinePrimitive, MotionSink};
use crate::hardware::{HardwareError, HardwareManager};
use crate::motion::MotionController;
use crate::status::{status_report, MachineState, StatusReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared handle to the motion pipeline, passed to the canonical machine as
/// its `MotionSink` and to both real-time threads.
#[derive(Clone)]
pub struct MotionHandle(Arc<Mutex<MotionController>>);

impl MotionHandle {
    pub fn new(config: &Config) -> Self {
        Self(Arc::new(Mutex::new(MotionController::new(config))))
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, MotionController> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MotionSink for MotionHandle {
    fn accept_line(&mut self, line: LinePrimitive) -> BlockResult {
        self.lock().accept_line(line)
    }

    fn accept_dwell(&mut self, dwell: DwellPrimitive) -> BlockResult {
        self.lock().accept_dwell(dwell)
    }

    fn accept_command(&mut self, command: CommandPrimitive) -> BlockResult {
        self.lock().accept_command(command)
    }
}

/// Sleeps a periodic loop body to a fixed deadline rather than a fixed
/// sleep duration, so drift doesn't accumulate across iterations.
fn run_periodic(period: Duration, shutdown: &AtomicBool, mut tick: impl FnMut()) {
    let mut deadline = Instant::now();
    while !shutdown.load(Ordering::Relaxed) {
        deadline += period;
        tick();
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        } else {
            deadline = now;
        }
    }
}

pub struct Printer {
    config: Config,
    machine: CanonicalMachine<MotionHandle>,
    motion: MotionHandle,
    hardware: HardwareManager,
    shutdown: Arc<AtomicBool>,
    segment_thread: Option<std::thread::JoinHandle<()>>,
    stepper_thread: Option<std::thread::JoinHandle<()>>,
    last_line_no: u32,
}

impl Printer {
    pub fn new(config: Config) -> Self {
        let motion = MotionHandle::new(&config);
        let machine = CanonicalMachine::new(&config, motion.clone());
        let hardware = HardwareManager::new(&config);
        Self {
            config,
            machine,
            motion,
            hardware,
            shutdown: Arc::new(AtomicBool::new(false)),
            segment_thread: None,
            stepper_thread: None,
            last_line_no: 0,
        }
    }

    pub async fn connect_hardware(&mut self) -> Result<(), HardwareError> {
        self.hardware.connect().await
    }

    pub fn hardware(&self) -> &HardwareManager {
        &self.hardware
    }

    /// Spawns the segment-prep and stepper-tick real-time threads.
    pub fn start(&mut self) {
        self.shutdown.store(false, Ordering::SeqCst);

        let segment_time = Duration::from_secs_f64(self.config.system.segment_time.max(1e-6));
        let motion = self.motion.clone();
        let shutdown = self.shutdown.clone();
        self.segment_thread = Some(std::thread::spawn(move || {
            run_periodic(segment_time, &shutdown, || {
                motion.lock().prepare_segment();
            });
        }));

        let tick_period = Duration::from_secs_f64(self.config.system.dda_tick_period.max(1e-6));
        let motion = self.motion.clone();
        let shutdown = self.shutdown.clone();
        self.stepper_thread = Some(std::thread::spawn(move || {
            run_periodic(tick_period, &shutdown, || {
                motion.lock().tick();
            });
        }));

        tracing::info!("segment-prep and stepper-tick threads started");
    }

    /// Stops the real-time threads and waits for them to exit.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.segment_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.stepper_thread.take() {
            let _ = handle.join();
        }
    }

    pub fn execute_block(&mut self, text: &str, line_no: u32) -> StatusCode {
        self.last_line_no = line_no;
        self.machine.execute_block(text, &self.config, line_no)
    }

    pub fn status_report(&self, machine_state: MachineState) -> StatusReport {
        let motion = self.motion.lock();
        status_report(&self.machine, &motion, &self.config, self.last_line_no, machine_state)
    }

    pub fn feedhold(&mut self) {
        self.motion.lock().feedhold();
    }

    pub fn resume(&mut self) {
        self.motion.lock().resume();
    }

    pub fn abort(&mut self) {
        self.motion.lock().abort();
        self.machine.alarmed = false;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Printer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.motors[0].axis = Some(crate::axes::Axis::X);
        for axis in config.axes.iter_mut() {
            axis.velocity_max = 500.0;
            axis.feedrate_max = 300.0;
            axis.jerk_max = 50_000_000.0;
        }
        config.system.segment_time = 0.0005;
        config.system.dda_tick_period = 0.00005;
        config
    }

    #[test]
    fn execute_block_enqueues_a_move() {
        let mut printer = Printer::new(test_config());
        let status = printer.execute_block("G1 X10 F200", 1);
        assert!(status.is_ok());
        assert!(!printer.motion.lock().queue().is_empty());
    }

    #[test]
    fn real_time_threads_drain_a_queued_move() {
        let mut printer = Printer::new(test_config());
        printer.execute_block("G1 X10 F200", 1);

        printer.start();
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if printer.motion.lock().queue().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        printer.shutdown();
        assert!(printer.motion.lock().queue().is_empty());
    }

    #[test]
    fn status_report_reflects_machine_state() {
        let printer = Printer::new(test_config());
        let report = printer.status_report(MachineState::Ready);
        assert_eq!(report.machine_state, MachineState::Ready);
    }
}
