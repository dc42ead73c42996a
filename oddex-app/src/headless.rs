use oddex_core::{KeyPress, Probe, StimulusKind};
use oddex_experiment::Display;
use oddex_experiment::sim::Participant;
use oddex_timing::{FrameStats, Timer};
use std::time::Duration;
use tracing::{debug, trace};

/// Display without a window.
///
/// Paced mode sleeps each flip to the next refresh deadline on `timer`, so a
/// run takes as long as it would on screen. Unpaced mode advances a virtual
/// clock by one refresh period per flip. A simulated participant supplies the
/// key presses.
pub struct HeadlessDisplay<T: Timer<Timestamp = u64>> {
    timer: T,
    period_ns: u64,
    paced: bool,
    virtual_ns: u64,
    next_deadline_ns: u64,
    last_flip_ns: Option<u64>,
    flips: u64,
    probe: Option<Probe>,
    participant: Participant,
}

impl<T: Timer<Timestamp = u64>> HeadlessDisplay<T> {
    pub fn new(timer: T, refresh_hz: f64, paced: bool, participant: Participant) -> Self {
        let period_ns = (1e9 / refresh_hz).round() as u64;
        let now = timer.now();
        Self {
            timer,
            period_ns,
            paced,
            virtual_ns: now,
            next_deadline_ns: now + period_ns,
            last_flip_ns: None,
            flips: 0,
            probe: None,
            participant,
        }
    }

    pub fn flips(&self) -> u64 {
        self.flips
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.timer.frame_stats()
    }

    fn now_ns(&self) -> u64 {
        if self.paced {
            self.timer.now()
        } else {
            self.virtual_ns
        }
    }

    fn seconds(&self, ns: u64) -> f64 {
        self.timer.seconds(ns)
    }

    fn wait_for_deadline(&mut self) -> u64 {
        if !self.paced {
            self.virtual_ns += self.period_ns;
            return self.virtual_ns;
        }
        // Missed deadlines resync to the next period instead of bursting.
        let now = self.timer.now();
        if now > self.next_deadline_ns {
            let behind = (now - self.next_deadline_ns) / self.period_ns + 1;
            self.next_deadline_ns += behind * self.period_ns;
        }
        self.timer
            .sleep(Duration::from_nanos(self.next_deadline_ns.saturating_sub(now)));
        self.next_deadline_ns += self.period_ns;
        self.timer.now()
    }
}

impl<T: Timer<Timestamp = u64>> Display for HeadlessDisplay<T> {
    fn draw_stimulus(&mut self, stimulus: StimulusKind) {
        trace!(stimulus = stimulus.name(), "draw");
    }

    fn render_probe(&mut self, probe: &Probe) {
        self.probe = Some(*probe);
    }

    fn draw_fixation_cross(&mut self) {}

    fn draw_text(&mut self, text: &str) {
        debug!(text, "Message shown");
    }

    fn flip(&mut self) -> f64 {
        let flip_ns = self.wait_for_deadline();
        if let Some(last) = self.last_flip_ns {
            self.timer
                .record_frame(Duration::from_nanos(flip_ns.saturating_sub(last)));
        }
        self.last_flip_ns = Some(flip_ns);
        self.flips += 1;
        let t = self.seconds(flip_ns);
        self.participant.observe(self.probe.take().as_ref(), t);
        t
    }

    fn poll_keys(&mut self) -> Vec<KeyPress> {
        let now = self.seconds(self.now_ns());
        self.participant.due(now)
    }

    fn clock(&self) -> f64 {
        self.seconds(self.now_ns())
    }

    fn wait_for_key(&mut self, timeout: Option<Duration>) -> Option<KeyPress> {
        // The simulated participant reads for a moment, then continues.
        let pause = timeout
            .unwrap_or(Duration::from_millis(500))
            .min(Duration::from_millis(500));
        if self.paced {
            self.timer.sleep(pause);
        } else {
            self.virtual_ns += pause.as_nanos() as u64;
        }
        // Pacing restarts from here rather than catching up the pause.
        self.next_deadline_ns = self.now_ns() + self.period_ns;
        self.last_flip_ns = None;
        Some(KeyPress::new("return", self.clock()))
    }
}
