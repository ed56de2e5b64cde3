//! Fall detection state machine
//!
//! A free-fall onset (gravity ratio below [`FREE_FALL_THRESHOLD`]) opens a
//! detection window. Within the window the machine looks for a landing spike
//! during the first second and a settled "still" reading by the end of the
//! third second. Confirmation emits a [`FallEvent`]; anything else times the
//! window out silently.
//!
//! Each window carries a generation number so that scheduled re-checks
//! ([`FallStateMachine::recheck`]) issued for a window that has since been
//! resolved or reset are ignored.

use tracing::{debug, info, trace, warn};

use crate::types::{DetectionState, DetectionWindow, FallEvent, Intensity, IntensityProfile};

/// Gravity ratio below which the device is considered to be in free fall
pub const FREE_FALL_THRESHOLD: f64 = 0.3;

/// Landing must be observed while elapsed whole seconds are at most this
pub const LANDING_WINDOW_SECS: i64 = 1;

/// Stillness must be observed while elapsed whole seconds are at most this
pub const SETTLE_WINDOW_SECS: i64 = 3;

/// Result of evaluating an open window
#[derive(Debug, Clone, Copy, PartialEq)]
enum WindowOutcome {
    Pending,
    Confirmed(FallEvent),
    TimedOut,
}

/// Single-writer fall detection state machine
#[derive(Debug, Clone)]
pub struct FallStateMachine {
    profile: IntensityProfile,
    state: DetectionState,
    next_generation: u64,
}

impl FallStateMachine {
    pub fn new(intensity: Intensity) -> Self {
        Self::with_profile(intensity.profile())
    }

    pub fn with_profile(profile: IntensityProfile) -> Self {
        Self {
            profile,
            state: DetectionState::Idle,
            next_generation: 0,
        }
    }

    pub fn profile(&self) -> &IntensityProfile {
        &self.profile
    }

    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    /// Generation of the open window, if any
    pub fn active_generation(&self) -> Option<u64> {
        self.state.window().map(|w| w.generation)
    }

    /// Feed one gravity ratio observed at `now_millis`.
    ///
    /// Returns the finalized event when this sample confirms a fall.
    /// Non-finite ratios are ignored without touching state.
    pub fn on_sample(&mut self, now_millis: i64, gravity_ratio: f64) -> Option<FallEvent> {
        if !gravity_ratio.is_finite() {
            warn!(now_millis, "ignoring non-finite gravity ratio");
            return None;
        }

        if self.state.is_idle() {
            self.try_open(now_millis, gravity_ratio);
            return None;
        }

        match self.evaluate(now_millis, gravity_ratio) {
            WindowOutcome::Confirmed(event) => Some(event),
            WindowOutcome::TimedOut => {
                // The sample that closed the old window may itself be a new onset
                self.try_open(now_millis, gravity_ratio);
                None
            }
            WindowOutcome::Pending => None,
        }
    }

    /// Re-evaluate the open window against its most recent reading.
    ///
    /// Does nothing unless `generation` names the currently open window.
    pub fn recheck(&mut self, now_millis: i64, generation: u64) -> Option<FallEvent> {
        let ratio = match &self.state {
            DetectionState::AwaitingLanding(window) if window.generation == generation => {
                window.last_ratio
            }
            _ => {
                trace!(generation, "stale re-check ignored");
                return None;
            }
        };

        match self.evaluate(now_millis, ratio) {
            WindowOutcome::Confirmed(event) => Some(event),
            WindowOutcome::TimedOut | WindowOutcome::Pending => None,
        }
    }

    /// Drop any in-flight window
    pub fn reset(&mut self) {
        if let Some(window) = self.state.window() {
            debug!(generation = window.generation, "detection window reset");
        }
        self.state = DetectionState::Idle;
    }

    fn try_open(&mut self, now_millis: i64, gravity_ratio: f64) {
        if gravity_ratio >= FREE_FALL_THRESHOLD {
            return;
        }

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        self.state = DetectionState::AwaitingLanding(DetectionWindow {
            generation,
            start_millis: now_millis,
            landing_confirmed: false,
            last_ratio: gravity_ratio,
            last_seen_millis: now_millis,
        });
        debug!(generation, now_millis, gravity_ratio, "free-fall onset");
    }

    fn evaluate(&mut self, now_millis: i64, gravity_ratio: f64) -> WindowOutcome {
        let profile = self.profile;
        let DetectionState::AwaitingLanding(window) = &mut self.state else {
            return WindowOutcome::Pending;
        };

        if now_millis < window.last_seen_millis {
            warn!(
                now_millis,
                last_seen_millis = window.last_seen_millis,
                "timestamp went backward"
            );
        }
        let elapsed_millis = now_millis.saturating_sub(window.start_millis).max(0);
        let elapsed_secs = elapsed_millis / 1000;

        if elapsed_secs > SETTLE_WINDOW_SECS {
            debug!(
                generation = window.generation,
                elapsed_millis, "detection window timed out"
            );
            self.state = DetectionState::Idle;
            return WindowOutcome::TimedOut;
        }

        // Stillness only counts after a landing seen on an earlier evaluation
        let landed_before = window.landing_confirmed;
        if elapsed_secs <= LANDING_WINDOW_SECS && profile.is_landing(gravity_ratio) {
            window.landing_confirmed = true;
        }
        window.last_ratio = gravity_ratio;
        window.last_seen_millis = window.last_seen_millis.max(now_millis);

        if landed_before && profile.is_still(gravity_ratio) {
            let event = FallEvent {
                timestamp_millis: now_millis,
                duration_millis: elapsed_millis,
            };
            info!(
                generation = window.generation,
                duration_millis = elapsed_millis,
                "fall confirmed"
            );
            self.state = DetectionState::Idle;
            return WindowOutcome::Confirmed(event);
        }

        WindowOutcome::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn feed(machine: &mut FallStateMachine, samples: &[(i64, f64)]) -> Vec<FallEvent> {
        samples
            .iter()
            .filter_map(|&(t, ratio)| machine.on_sample(t, ratio))
            .collect()
    }

    #[test]
    fn test_medium_fall_confirms() {
        let mut machine = FallStateMachine::new(Intensity::Medium);

        assert_eq!(machine.on_sample(0, 0.1), None);
        assert_eq!(machine.active_generation(), Some(0));
        assert_eq!(machine.on_sample(500, 1.05), None);
        assert!(machine.state().window().unwrap().landing_confirmed);

        let event = machine.on_sample(1000, 1.0).expect("fall should confirm");
        assert_eq!(
            event,
            FallEvent {
                timestamp_millis: 1000,
                duration_millis: 1000
            }
        );
        assert!(machine.state().is_idle());
    }

    #[test]
    fn test_idle_without_onset() {
        let mut machine = FallStateMachine::new(Intensity::Low);
        let events = feed(&mut machine, &[(0, 1.0), (100, 0.3), (200, 2.5), (300, 0.9)]);
        assert!(events.is_empty());
        assert!(machine.state().is_idle());
    }

    #[test]
    fn test_unconfirmed_window_times_out_then_accepts_new_onset() {
        let mut machine = FallStateMachine::new(Intensity::Medium);

        let events = feed(&mut machine, &[(0, 0.1), (500, 1.5), (4000, 1.0)]);
        assert!(events.is_empty());
        assert!(machine.state().is_idle());

        let events = feed(&mut machine, &[(5000, 0.2), (5500, 1.5), (6000, 1.0)]);
        assert_eq!(
            events,
            vec![FallEvent {
                timestamp_millis: 6000,
                duration_millis: 1000
            }]
        );
    }

    #[test]
    fn test_timeout_sample_can_open_fresh_window() {
        let mut machine = FallStateMachine::new(Intensity::Medium);
        machine.on_sample(0, 0.1);
        machine.on_sample(4500, 0.05);

        let window = machine.state().window().copied().unwrap();
        assert_eq!(window.start_millis, 4500);
        assert_eq!(window.generation, 1);
        assert!(!window.landing_confirmed);
    }

    #[test]
    fn test_landing_after_first_second_ignored() {
        let mut machine = FallStateMachine::new(Intensity::Medium);
        let events = feed(&mut machine, &[(0, 0.1), (2000, 1.5), (2500, 1.0)]);
        assert!(events.is_empty());
        assert!(!machine.state().window().unwrap().landing_confirmed);
    }

    #[test]
    fn test_window_boundaries() {
        let mut machine = FallStateMachine::new(Intensity::Medium);
        let events = feed(&mut machine, &[(0, 0.1), (1999, 1.5), (3999, 1.0)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_millis, 3999);

        let mut machine = FallStateMachine::new(Intensity::Medium);
        let events = feed(&mut machine, &[(0, 0.1), (1999, 1.5), (4000, 1.0)]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_spike_sample_alone_does_not_confirm() {
        // 1.05 is both above MEDIUM landing and inside its still band
        let mut machine = FallStateMachine::new(Intensity::Medium);
        let events = feed(&mut machine, &[(0, 0.1), (400, 1.05)]);
        assert!(events.is_empty());
        assert_eq!(machine.on_sample(900, 1.05).map(|e| e.duration_millis), Some(900));
    }

    #[test]
    fn test_onset_during_open_window_keeps_window() {
        let mut machine = FallStateMachine::new(Intensity::Medium);
        let events = feed(&mut machine, &[(0, 0.1), (800, 0.1), (900, 1.5), (1500, 1.0)]);
        assert_eq!(events[0].duration_millis, 1500);
        assert_eq!(machine.active_generation(), None);
    }

    #[test]
    fn test_reset_mid_window() {
        let mut machine = FallStateMachine::new(Intensity::Medium);
        feed(&mut machine, &[(0, 0.1), (500, 1.5)]);
        let stale = machine.active_generation().unwrap();

        machine.reset();
        assert!(machine.state().is_idle());
        assert_eq!(machine.on_sample(1000, 1.0), None);
        assert_eq!(machine.recheck(1000, stale), None);
        assert!(machine.state().is_idle());
    }

    #[test]
    fn test_intensity_strictness() {
        let sequence = [(0, 0.1), (500, 0.9), (1000, 0.95)];

        let mut low = FallStateMachine::new(Intensity::Low);
        assert_eq!(feed(&mut low, &sequence).len(), 1);

        let mut high = FallStateMachine::new(Intensity::High);
        assert!(feed(&mut high, &sequence).is_empty());
    }

    #[test]
    fn test_deterministic_across_runs() {
        let sequence: Vec<(i64, f64)> = vec![
            (0, 1.0),
            (20, 0.2),
            (300, 2.4),
            (700, 1.1),
            (2000, 0.05),
            (2600, 3.0),
            (3100, 1.1),
            (9000, 0.1),
        ];
        for intensity in Intensity::ALL {
            let first = feed(&mut FallStateMachine::new(intensity), &sequence);
            let second = feed(&mut FallStateMachine::new(intensity), &sequence);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_backward_timestamp_never_negative() {
        let mut machine = FallStateMachine::new(Intensity::Medium);
        let events = feed(&mut machine, &[(1000, 0.1), (900, 1.5), (800, 1.0)]);
        assert_eq!(
            events,
            vec![FallEvent {
                timestamp_millis: 800,
                duration_millis: 0
            }]
        );
    }

    #[test]
    fn test_non_finite_ratio_ignored() {
        let mut machine = FallStateMachine::new(Intensity::Medium);
        machine.on_sample(0, 0.1);
        let before = *machine.state();

        assert_eq!(machine.on_sample(300, f64::NAN), None);
        assert_eq!(machine.on_sample(400, f64::INFINITY), None);
        assert_eq!(*machine.state(), before);

        let mut idle = FallStateMachine::new(Intensity::Medium);
        idle.on_sample(0, f64::NAN);
        assert!(idle.state().is_idle());
    }

    #[test]
    fn test_recheck_uses_latest_reading() {
        let mut machine = FallStateMachine::new(Intensity::Medium);
        machine.on_sample(0, 0.1);
        let generation = machine.active_generation().unwrap();
        machine.on_sample(500, 1.05);

        assert_eq!(machine.recheck(1000, generation + 1), None);
        let event = machine.recheck(1000, generation).unwrap();
        assert_eq!(event.duration_millis, 1000);
        assert_eq!(machine.recheck(1500, generation), None);
    }

    #[test]
    fn test_recheck_times_out_window() {
        let mut machine = FallStateMachine::new(Intensity::High);
        machine.on_sample(0, 0.1);
        let generation = machine.active_generation().unwrap();

        assert_eq!(machine.recheck(3500, generation), None);
        assert!(machine.state().window().is_some());
        assert_eq!(machine.recheck(4000, generation), None);
        assert!(machine.state().is_idle());
    }

    proptest! {
        #[test]
        fn prop_no_event_without_free_fall(
            steps in prop::collection::vec((0i64..2000, FREE_FALL_THRESHOLD..6.0f64), 0..200)
        ) {
            for intensity in Intensity::ALL {
                let mut machine = FallStateMachine::new(intensity);
                let mut now = 0i64;
                for &(delta, ratio) in &steps {
                    now += delta;
                    prop_assert!(machine.on_sample(now, ratio).is_none());
                }
                prop_assert!(machine.state().is_idle());
            }
        }
    }
}
