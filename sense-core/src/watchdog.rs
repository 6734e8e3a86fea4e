//! Liveness watchdog.
//!
//! A timer that forces recovery action if not periodically fed. Armed only
//! while the device believes it should be reachable (MQTT connected) and
//! disarmed in AP/config mode, where unreachability is expected and must not
//! cause a reboot loop.

/// Default timeout: 20 minutes without a feed forces a restart.
pub const DEFAULT_TIMEOUT_MS: u64 = 1_200_000;

pub struct LivenessWatchdog {
    timeout_ms: u64,
    /// `None` while disarmed; while disarmed the watchdog never fires.
    deadline_ms: Option<u64>,
}

impl LivenessWatchdog {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            deadline_ms: None,
        }
    }

    /// Arm the watchdog. Re-arming resets the deadline, so calling this twice
    /// in a row behaves as a single arm.
    pub fn init(&mut self, now_ms: u64) {
        self.deadline_ms = Some(now_ms + self.timeout_ms);
    }

    /// Push the deadline out. Feeding a disarmed watchdog is a no-op.
    pub fn feed(&mut self, now_ms: u64) {
        if self.deadline_ms.is_some() {
            self.deadline_ms = Some(now_ms + self.timeout_ms);
        }
    }

    /// Disarm without firing.
    pub fn deinit(&mut self) {
        self.deadline_ms = None;
    }

    pub fn armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    /// Returns true exactly once when the deadline passes while armed, then
    /// auto-disarms so the timeout cannot fire repeatedly.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.deadline_ms {
            Some(deadline) if now_ms >= deadline => {
                self.deadline_ms = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_timeout_then_disarms() {
        let mut wd = LivenessWatchdog::new(DEFAULT_TIMEOUT_MS);
        wd.init(0);
        assert!(!wd.poll(1_199_999));
        assert!(wd.poll(1_200_000));
        assert!(!wd.armed());
        // No repeated firing, no matter how much time passes.
        assert!(!wd.poll(10_000_000));
    }

    #[test]
    fn feed_resets_deadline() {
        let mut wd = LivenessWatchdog::new(1000);
        wd.init(0);
        wd.feed(900);
        assert!(!wd.poll(1500));
        assert!(wd.poll(1900));
    }

    #[test]
    fn feeding_disarmed_watchdog_is_a_no_op() {
        let mut wd = LivenessWatchdog::new(1000);
        wd.feed(0);
        assert!(!wd.armed());
        assert!(!wd.poll(5000));

        wd.init(0);
        wd.deinit();
        wd.feed(100);
        assert!(!wd.armed());
        assert!(!wd.poll(5000));
    }

    #[test]
    fn double_init_behaves_as_single_arm() {
        let mut wd = LivenessWatchdog::new(1000);
        wd.init(0);
        wd.init(500);
        assert!(!wd.poll(1200));
        assert!(wd.poll(1500));
    }

    #[test]
    fn disarmed_never_fires_regardless_of_elapsed_time() {
        let mut wd = LivenessWatchdog::new(1);
        for t in [0, 1_000, 1_000_000, u64::MAX] {
            assert!(!wd.poll(t));
        }
    }
}
