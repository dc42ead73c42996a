//! Collaborator surfaces the engine drives: the eye tracker and the display.

use crate::error::DeviceError;
use oddex_core::{KeyPress, Probe, StimulusKind};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Tracker recording state as reported by a status query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordingStatus {
    /// Recording and healthy
    Ok,
    Idle,
    Other(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftOutcome {
    Accepted,
    /// Participant pressed escape; tracker setup should be re-entered
    Recalibrate,
    Failed(i32),
}

pub trait Tracker {
    fn send_message(&mut self, message: &str) -> Result<(), DeviceError>;
    fn send_command(&mut self, command: &str) -> Result<(), DeviceError>;
    fn recording_status(&mut self) -> Result<RecordingStatus, DeviceError>;
    fn start_recording(&mut self) -> Result<(), DeviceError>;
    fn stop_recording(&mut self) -> Result<(), DeviceError>;
    fn set_offline_mode(&mut self) -> Result<(), DeviceError>;
    fn drift_correct(&mut self, x: u32, y: u32) -> Result<DriftOutcome, DeviceError>;
    fn tracker_setup(&mut self) -> Result<(), DeviceError>;
    fn open_data_file(&mut self, name: &str) -> Result<(), DeviceError>;
    fn close_data_file(&mut self) -> Result<(), DeviceError>;
    fn receive_data_file(&mut self, remote: &str, local: &Path) -> Result<(), DeviceError>;
    fn is_connected(&self) -> bool;
    fn close(&mut self);
}

/// Frame surface. `flip` blocks until the frame is on screen and its return
/// value is the only timestamp used for onsets and offsets.
pub trait Display {
    fn draw_stimulus(&mut self, stimulus: StimulusKind);
    fn render_probe(&mut self, probe: &Probe);
    fn draw_fixation_cross(&mut self);
    fn draw_text(&mut self, text: &str);
    fn flip(&mut self) -> f64;
    /// Key presses since the last poll, each with its own timestamp
    fn poll_keys(&mut self) -> Vec<KeyPress>;
    /// Monotonic clock in seconds, same epoch as `flip`
    fn clock(&self) -> f64;
    fn wait_for_key(&mut self, timeout: Option<Duration>) -> Option<KeyPress>;

    /// Shows `text` on a cleared screen and optionally waits for a key.
    fn show_message(
        &mut self,
        text: &str,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Option<KeyPress> {
        self.flip();
        self.draw_text(text);
        self.flip();
        if !wait {
            return None;
        }
        self.poll_keys();
        let key = self.wait_for_key(timeout);
        self.flip();
        key
    }
}

impl<T: Tracker + ?Sized> Tracker for &mut T {
    fn send_message(&mut self, message: &str) -> Result<(), DeviceError> {
        (**self).send_message(message)
    }
    fn send_command(&mut self, command: &str) -> Result<(), DeviceError> {
        (**self).send_command(command)
    }
    fn recording_status(&mut self) -> Result<RecordingStatus, DeviceError> {
        (**self).recording_status()
    }
    fn start_recording(&mut self) -> Result<(), DeviceError> {
        (**self).start_recording()
    }
    fn stop_recording(&mut self) -> Result<(), DeviceError> {
        (**self).stop_recording()
    }
    fn set_offline_mode(&mut self) -> Result<(), DeviceError> {
        (**self).set_offline_mode()
    }
    fn drift_correct(&mut self, x: u32, y: u32) -> Result<DriftOutcome, DeviceError> {
        (**self).drift_correct(x, y)
    }
    fn tracker_setup(&mut self) -> Result<(), DeviceError> {
        (**self).tracker_setup()
    }
    fn open_data_file(&mut self, name: &str) -> Result<(), DeviceError> {
        (**self).open_data_file(name)
    }
    fn close_data_file(&mut self) -> Result<(), DeviceError> {
        (**self).close_data_file()
    }
    fn receive_data_file(&mut self, remote: &str, local: &Path) -> Result<(), DeviceError> {
        (**self).receive_data_file(remote, local)
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn close(&mut self) {
        (**self).close()
    }
}

impl<D: Display + ?Sized> Display for &mut D {
    fn draw_stimulus(&mut self, stimulus: StimulusKind) {
        (**self).draw_stimulus(stimulus)
    }
    fn render_probe(&mut self, probe: &Probe) {
        (**self).render_probe(probe)
    }
    fn draw_fixation_cross(&mut self) {
        (**self).draw_fixation_cross()
    }
    fn draw_text(&mut self, text: &str) {
        (**self).draw_text(text)
    }
    fn flip(&mut self) -> f64 {
        (**self).flip()
    }
    fn poll_keys(&mut self) -> Vec<KeyPress> {
        (**self).poll_keys()
    }
    fn clock(&self) -> f64 {
        (**self).clock()
    }
    fn wait_for_key(&mut self, timeout: Option<Duration>) -> Option<KeyPress> {
        (**self).wait_for_key(timeout)
    }
}
