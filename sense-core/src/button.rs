//! Button gesture classifier.
//!
//! Turns raw digital pin levels into discrete press events. The raw level is
//! debounced with a stability window; on release the held duration is
//! bucketed into one of four gestures. At most one event is produced per
//! press cycle.

/// Press duration thresholds, in milliseconds. Each bucket is bounded above
/// by its `*_max_ms` value; anything longer than `very_long_max_ms` is an
/// ultra-long press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureConfig {
    pub debounce_ms: u64,
    pub short_max_ms: u64,
    pub long_max_ms: u64,
    pub very_long_max_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            short_max_ms: 1000,
            long_max_ms: 5000,
            very_long_max_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressEvent {
    Short,
    Long,
    VeryLong,
    UltraLong,
}

/// Poll-driven debouncer and duration classifier for a single button.
pub struct GestureClassifier {
    config: GestureConfig,
    /// Debounced level (true = pressed).
    stable: bool,
    /// Raw level seen on the most recent poll.
    candidate: bool,
    /// When the raw level last changed.
    candidate_since_ms: u64,
    /// Debounced press-down edge timestamp, valid while `stable`.
    press_start_ms: u64,
}

impl GestureClassifier {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            stable: false,
            candidate: false,
            candidate_since_ms: 0,
            press_start_ms: 0,
        }
    }

    /// Advance the debouncer with the current raw pin level. Returns a press
    /// event on a debounced release, otherwise `None`. A press shorter than
    /// the debounce window never surfaces.
    pub fn poll(&mut self, raw_pressed: bool, now_ms: u64) -> Option<PressEvent> {
        if raw_pressed != self.candidate {
            self.candidate = raw_pressed;
            self.candidate_since_ms = now_ms;
        }

        if self.candidate == self.stable {
            return None;
        }

        // Commit the level change only once it has been stable for the
        // debounce window. Edge timestamps are the raw transition times, so
        // the measured duration is independent of the poll cadence.
        if now_ms.saturating_sub(self.candidate_since_ms) < self.config.debounce_ms {
            return None;
        }

        self.stable = self.candidate;
        if self.stable {
            self.press_start_ms = self.candidate_since_ms;
            None
        } else {
            let held_ms = self.candidate_since_ms.saturating_sub(self.press_start_ms);
            Some(self.classify(held_ms))
        }
    }

    /// Bucket a held duration. Monotonic: a longer hold never maps to a
    /// shorter gesture.
    fn classify(&self, held_ms: u64) -> PressEvent {
        if held_ms <= self.config.short_max_ms {
            PressEvent::Short
        } else if held_ms <= self.config.long_max_ms {
            PressEvent::Long
        } else if held_ms <= self.config.very_long_max_ms {
            PressEvent::VeryLong
        } else {
            PressEvent::UltraLong
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Simulate a full press cycle polled every `step` ms, returning the
    /// event produced on release (if any).
    fn press_for(classifier: &mut GestureClassifier, start_ms: u64, hold_ms: u64) -> Option<PressEvent> {
        let step = 10;
        let mut event = None;
        let mut t = start_ms;
        while t < start_ms + hold_ms {
            assert_eq!(classifier.poll(true, t), None, "no event before release");
            t += step;
        }
        // Keep polling the released level until the debouncer settles.
        let release = start_ms + hold_ms;
        for i in 0..50 {
            if let Some(e) = classifier.poll(false, release + i * step) {
                event = Some(e);
                break;
            }
        }
        event
    }

    #[test]
    fn bucket_boundaries() {
        let config = GestureConfig::default();
        let cases = [
            (100, Some(PressEvent::Short)),
            (1000, Some(PressEvent::Short)),
            (1010, Some(PressEvent::Long)),
            (5000, Some(PressEvent::Long)),
            (5010, Some(PressEvent::VeryLong)),
            (10_000, Some(PressEvent::VeryLong)),
            (10_010, Some(PressEvent::UltraLong)),
            (60_000, Some(PressEvent::UltraLong)),
        ];
        for (hold, expected) in cases {
            let mut classifier = GestureClassifier::new(config);
            assert_eq!(press_for(&mut classifier, 0, hold), expected, "hold {hold}ms");
        }
    }

    #[test]
    fn press_shorter_than_debounce_is_ignored() {
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        assert_eq!(classifier.poll(true, 0), None);
        assert_eq!(classifier.poll(false, 20), None);
        // Long after, the level is still released and no event ever fires.
        for t in (30..500).step_by(10) {
            assert_eq!(classifier.poll(false, t), None);
        }
    }

    #[test]
    fn one_event_per_press_cycle() {
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        assert!(press_for(&mut classifier, 0, 2000).is_some());
        // Idle polling after the cycle produces nothing further.
        for t in (3000..4000).step_by(10) {
            assert_eq!(classifier.poll(false, t), None);
        }
    }

    #[test]
    fn consecutive_presses_classify_independently() {
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        assert_eq!(press_for(&mut classifier, 0, 200), Some(PressEvent::Short));
        assert_eq!(press_for(&mut classifier, 5000, 2000), Some(PressEvent::Long));
        assert_eq!(press_for(&mut classifier, 10_000, 200), Some(PressEvent::Short));
    }

    #[test]
    fn bounce_during_press_does_not_split_the_cycle() {
        let mut classifier = GestureClassifier::new(GestureConfig::default());
        assert_eq!(classifier.poll(true, 0), None);
        assert_eq!(classifier.poll(true, 100), None);
        // 20ms glitch low at t=200, back high before the debounce window.
        assert_eq!(classifier.poll(false, 200), None);
        assert_eq!(classifier.poll(true, 220), None);
        for t in (230..2000).step_by(10) {
            assert_eq!(classifier.poll(true, t), None);
        }
        // Release at t=2000: duration measured from the original press edge.
        let mut event = None;
        for i in 0..10 {
            if let Some(e) = classifier.poll(false, 2000 + i * 10) {
                event = Some(e);
                break;
            }
        }
        assert_eq!(event, Some(PressEvent::Long));
    }

    fn rank(event: PressEvent) -> u8 {
        match event {
            PressEvent::Short => 0,
            PressEvent::Long => 1,
            PressEvent::VeryLong => 2,
            PressEvent::UltraLong => 3,
        }
    }

    proptest! {
        #[test]
        fn classification_is_monotonic(a in 60u64..30_000, b in 60u64..30_000) {
            let (short, long) = if a <= b { (a, b) } else { (b, a) };
            let config = GestureConfig::default();
            let mut first = GestureClassifier::new(config);
            let mut second = GestureClassifier::new(config);
            let ea = press_for(&mut first, 0, short).unwrap();
            let eb = press_for(&mut second, 0, long).unwrap();
            prop_assert!(rank(ea) <= rank(eb));
        }
    }
}
