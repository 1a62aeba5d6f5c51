// SPDX-License-Identifier: GPL-3.0-only

//! Background frame acquisition
//!
//! [`AcquisitionLoop`] pulls frames from a [`SensorStream`] on its own
//! thread and publishes them into a [`FrameCell`], a single-slot mailbox
//! with last-write-wins semantics. The render side takes at its own rate;
//! if it falls behind, intermediate frames are simply replaced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::SensorError;
use crate::sensor::{SensorFrame, SensorStream};

/// Single-slot frame mailbox shared between the acquisition thread and the
/// render loop.
#[derive(Default)]
pub struct FrameCell {
    slot: Mutex<Option<SensorFrame>>,
    fresh: AtomicBool,
}

impl FrameCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<SensorFrame>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Publish a frame, replacing any unconsumed one.
    pub fn publish(&self, frame: SensorFrame) {
        *self.lock_slot() = Some(frame);
        self.fresh.store(true, Ordering::Release);
    }

    /// Take the latest frame if one arrived since the last take.
    pub fn take(&self) -> Option<SensorFrame> {
        if !self.fresh.swap(false, Ordering::Acquire) {
            return None;
        }
        self.lock_slot().take()
    }

    /// Whether a frame is waiting without consuming it.
    pub fn is_fresh(&self) -> bool {
        self.fresh.load(Ordering::Acquire)
    }
}

/// Controller for a sensor acquisition thread.
///
/// The loop runs until stopped, pausing on request. A transient
/// [`SensorError::NoFrameAvailable`] is skipped; any other sensor error
/// ends the loop.
pub struct AcquisitionLoop {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    pause_signal: Arc<AtomicBool>,
    cell: Arc<FrameCell>,
    name: String,
}

impl AcquisitionLoop {
    /// Start acquiring frames from `stream`, sleeping `interval` between
    /// captures.
    pub fn start<S>(name: &str, mut stream: S, interval: Duration) -> Self
    where
        S: SensorStream + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let pause_signal = Arc::new(AtomicBool::new(false));
        let cell = Arc::new(FrameCell::new());

        let stop = Arc::clone(&stop_signal);
        let pause = Arc::clone(&pause_signal);
        let out = Arc::clone(&cell);
        let thread_name = name.to_string();

        info!(name = %name, "Starting acquisition loop");

        let thread_handle = thread::spawn(move || {
            debug!(name = %thread_name, "Acquisition thread started");

            loop {
                if stop.load(Ordering::SeqCst) {
                    debug!(name = %thread_name, "Stop signal received");
                    break;
                }
                if pause.load(Ordering::SeqCst) {
                    thread::sleep(interval.max(Duration::from_millis(1)));
                    continue;
                }

                match stream.next_frame() {
                    Ok(frame) => out.publish(frame),
                    Err(SensorError::NoFrameAvailable) => {
                        debug!(name = %thread_name, "No frame available, retrying");
                    }
                    Err(e) => {
                        warn!(name = %thread_name, error = %e, "Sensor failed, stopping acquisition");
                        break;
                    }
                }

                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            }

            info!(name = %thread_name, "Acquisition thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            pause_signal,
            cell,
            name: name.to_string(),
        }
    }

    /// Mailbox the loop publishes into.
    pub fn cell(&self) -> Arc<FrameCell> {
        Arc::clone(&self.cell)
    }

    /// Pause or resume capture without tearing down the thread.
    pub fn set_paused(&self, paused: bool) {
        info!(name = %self.name, paused, "Acquisition pause toggled");
        self.pause_signal.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.pause_signal.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop without waiting for the thread.
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting acquisition stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish.
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without signaling stop.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for acquisition thread");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Acquisition thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Acquisition thread finished");
            }
        }
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "AcquisitionLoop dropped, stopping");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::CameraIntrinsics;
    use crate::sensor::synthetic::SyntheticSensor;
    use std::time::Instant;

    fn tiny_frame(sequence: u64) -> SensorFrame {
        SensorFrame {
            width: 1,
            height: 1,
            depth: vec![100u16].into(),
            color: vec![0u8; 4].into(),
            intrinsics: CameraIntrinsics::scaled_to(1, 1),
            sequence,
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn test_cell_last_write_wins() {
        let cell = FrameCell::new();
        assert!(!cell.is_fresh());
        cell.publish(tiny_frame(1));
        cell.publish(tiny_frame(2));
        assert!(cell.is_fresh());

        let frame = cell.take().unwrap();
        assert_eq!(frame.sequence, 2);
        assert!(cell.take().is_none());
        assert!(!cell.is_fresh());
    }

    #[test]
    fn test_loop_publishes_frames() {
        let sensor = SyntheticSensor::new(16, 12, 1).with_noise(0.0, 0.0);
        let mut ctl = AcquisitionLoop::start("test-acquire", sensor, Duration::from_millis(1));
        let cell = ctl.cell();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut frame = None;
        while frame.is_none() && Instant::now() < deadline {
            frame = cell.take();
            thread::sleep(Duration::from_millis(5));
        }
        ctl.stop();
        assert!(frame.is_some());
        assert!(!ctl.is_running());
    }

    #[test]
    fn test_pause_halts_publication() {
        let sensor = SyntheticSensor::new(8, 8, 1).with_noise(0.0, 0.0);
        let mut ctl = AcquisitionLoop::start("test-pause", sensor, Duration::from_millis(1));
        let cell = ctl.cell();

        ctl.set_paused(true);
        assert!(ctl.is_paused());
        // Drain whatever was in flight before the pause landed.
        thread::sleep(Duration::from_millis(50));
        let _ = cell.take();
        thread::sleep(Duration::from_millis(50));
        assert!(!cell.is_fresh());

        ctl.set_paused(false);
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut resumed = false;
        while !resumed && Instant::now() < deadline {
            resumed = cell.take().is_some();
            thread::sleep(Duration::from_millis(5));
        }
        ctl.stop();
        assert!(resumed);
    }

    #[test]
    fn test_fatal_sensor_error_ends_loop() {
        struct FailingStream {
            left: u32,
        }
        impl SensorStream for FailingStream {
            fn next_frame(&mut self) -> Result<SensorFrame, SensorError> {
                if self.left == 0 {
                    return Err(SensorError::Disconnected);
                }
                self.left -= 1;
                Ok(tiny_frame(u64::from(self.left)))
            }
        }

        let mut ctl = AcquisitionLoop::start(
            "test-fatal",
            FailingStream { left: 2 },
            Duration::ZERO,
        );
        ctl.join();
        assert!(!ctl.is_running());
    }
}
