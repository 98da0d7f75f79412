/*
 * The pedestrian crossing state machine.
 *
 * This module is the only place with crossing logic in it: phase timing,
 * pedestrian calls, the debounce window and the crossing countdown. It is
 * all plain state and arithmetic. Pins, channels and every form of waiting
 * stay outside, so the whole machine can be stepped through in a test by
 * injecting synthetic events.
 *
 * Two kinds of event reach the machine: the one second tick and a raw
 * button edge. Whoever owns the machine feeds both through `handle_event`
 * and then pushes the lamp, cadence and status projections out to the
 * hardware.
 */

use crate::alert::Cadence;

/// Tick period the runtime is expected to feed `Event::Tick` at.
pub const TICK_PERIOD_MS: u32 = 1_000;

/// Edges from one physical press arrive in bursts; anything closer than
/// this window to the previous edge counts as the same press.
pub const DEBOUNCE_WINDOW_US: u64 = 300_000;

/// The crossing countdown covers the last five seconds of the stop phase.
pub const COUNTDOWN_START_MS: u32 = 5_000;
pub const COUNTDOWN_SECONDS: u8 = 5;

/// With fewer than this many countdown seconds left the alert switches
/// from the slow beat to the fast one.
const FAST_TIER_BELOW_S: u8 = 3;

// The countdown is clocked by the same tick as the phase timing, so the
// two have to agree, and the stop phase has to be long enough to hold the
// whole countdown.
const _: () = assert!(COUNTDOWN_SECONDS as u32 * TICK_PERIOD_MS == COUNTDOWN_START_MS);
const _: () = assert!(COUNTDOWN_START_MS <= Phase::Stop.duration_ms());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Stop,
    Caution,
    Go,
}

impl Phase {
    pub const fn duration_ms(self) -> u32 {
        match self {
            Phase::Stop => 10_000,
            Phase::Caution => 3_000,
            Phase::Go => 10_000,
        }
    }

    fn next(self) -> Phase {
        match self {
            Phase::Stop => Phase::Go,
            Phase::Go => Phase::Caution,
            Phase::Caution => Phase::Stop,
        }
    }
}

/// Which kerb the call came from. Only the logs care; both buttons feed
/// the same pending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallButton {
    A,
    B,
}

#[derive(Debug, Clone, Copy)]
pub enum Event {
    Tick { elapsed_ms: u32 },
    ButtonEdge { button: CallButton, timestamp_us: u64 },
}

/// What `handle_event` just did, for the runtime to narrate and the tests
/// to check. The current outputs come from the projection methods instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct Outcome {
    /// A transition happened and this phase was entered.
    pub entered: Option<Phase>,
    /// A debounced call was accepted from this button.
    pub call: Option<CallButton>,
    /// The countdown ticked (or started) and stands at this many seconds.
    pub countdown: Option<u8>,
}

/// Snapshot handed to the status display after every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    pub phase: Phase,
    pub remaining_ms: u32,
    pub call_pending: bool,
    /// Seconds left of the crossing window, while the countdown runs.
    pub countdown: Option<u8>,
}

pub struct Controller {
    phase: Phase,
    remaining_ms: u32,
    call_pending: bool,
    countdown_active: bool,
    countdown_seconds_left: u8,
    last_edge_timestamp_us: Option<u64>,
}

impl Controller {
    pub const fn new() -> Self {
        Controller {
            phase: Phase::Stop,
            remaining_ms: Phase::Stop.duration_ms(),
            call_pending: false,
            countdown_active: false,
            countdown_seconds_left: 0,
            last_edge_timestamp_us: None,
        }
    }

    pub fn handle_event(&mut self, event: Event) -> Outcome {
        match event {
            Event::Tick { elapsed_ms } => self.on_tick(elapsed_ms),
            Event::ButtonEdge {
                button,
                timestamp_us,
            } => self.on_button_edge(button, timestamp_us),
        }
    }

    fn on_tick(&mut self, elapsed_ms: u32) -> Outcome {
        let mut outcome = Outcome::default();

        self.remaining_ms = self.remaining_ms.saturating_sub(elapsed_ms);

        if self.countdown_active {
            self.countdown_seconds_left = self.countdown_seconds_left.saturating_sub(1);
            outcome.countdown = Some(self.countdown_seconds_left);
            if self.countdown_seconds_left == 0 {
                self.countdown_active = false;
            }
        } else if self.phase == Phase::Stop
            && self.call_pending
            && self.remaining_ms <= COUNTDOWN_START_MS
        {
            // The call is consumed the moment its countdown starts, so one
            // press buys exactly one crossing window.
            self.countdown_active = true;
            self.countdown_seconds_left = COUNTDOWN_SECONDS;
            self.call_pending = false;
            outcome.countdown = Some(COUNTDOWN_SECONDS);
        }

        if self.remaining_ms == 0 {
            let next = self.phase.next();
            self.enter(next);
            outcome.entered = Some(next);
        }

        outcome
    }

    fn on_button_edge(&mut self, button: CallButton, timestamp_us: u64) -> Outcome {
        let mut outcome = Outcome::default();

        // Both call buttons share the one debounce window; a press is a
        // press, no matter which kerb it came from.
        if let Some(last) = self.last_edge_timestamp_us {
            if timestamp_us.wrapping_sub(last) < DEBOUNCE_WINDOW_US {
                return outcome;
            }
        }
        self.last_edge_timestamp_us = Some(timestamp_us);

        self.call_pending = true;
        outcome.call = Some(button);

        // Pre-emptive call handling: fast-forward to caution so that the
        // next stop phase, and with it the crossing window, comes up early.
        // During caution the press is only recorded; the running caution
        // timer is left alone.
        if self.phase != Phase::Caution {
            self.enter(Phase::Caution);
            outcome.entered = Some(Phase::Caution);
        }

        outcome
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.remaining_ms = phase.duration_ms();
        // Leaving stop takes any running countdown with it, and the cadence
        // projection drops to Off, which forces the alert line low. A call
        // that is still pending survives the transition untouched.
        self.countdown_active = false;
        self.countdown_seconds_left = 0;
    }

    pub fn stop_lamp(&self) -> bool {
        match self.phase {
            Phase::Stop | Phase::Caution => true,
            Phase::Go => false,
        }
    }

    // Caution lights both heads at once: red plus green reads amber on a
    // two lamp crossing head.
    pub fn go_lamp(&self) -> bool {
        match self.phase {
            Phase::Go | Phase::Caution => true,
            Phase::Stop => false,
        }
    }

    pub fn cadence(&self) -> Cadence {
        if !self.countdown_active {
            Cadence::Off
        } else if self.countdown_seconds_left >= FAST_TIER_BELOW_S {
            Cadence::Slow
        } else {
            Cadence::Fast
        }
    }

    pub fn status(&self) -> Status {
        Status {
            phase: self.phase,
            remaining_ms: self.remaining_ms,
            call_pending: self.call_pending,
            countdown: self
                .countdown_active
                .then_some(self.countdown_seconds_left),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(controller: &mut Controller) -> Outcome {
        controller.handle_event(Event::Tick {
            elapsed_ms: TICK_PERIOD_MS,
        })
    }

    fn press(controller: &mut Controller, button: CallButton, at_ms: u64) -> Outcome {
        controller.handle_event(Event::ButtonEdge {
            button,
            timestamp_us: at_ms * 1_000,
        })
    }

    #[test]
    fn starts_in_stop_with_full_duration() {
        let controller = Controller::new();

        assert_eq!(
            controller.status(),
            Status {
                phase: Phase::Stop,
                remaining_ms: 10_000,
                call_pending: false,
                countdown: None,
            }
        );
        assert!(controller.stop_lamp());
        assert!(!controller.go_lamp());
        assert_eq!(controller.cadence(), Cadence::Off);
    }

    #[test]
    fn free_run_cycles_stop_go_caution() {
        let mut controller = Controller::new();

        for _ in 0..9 {
            assert_eq!(tick(&mut controller).entered, None);
        }
        assert_eq!(tick(&mut controller).entered, Some(Phase::Go));
        assert_eq!(controller.status().remaining_ms, 10_000);

        for _ in 0..9 {
            assert_eq!(tick(&mut controller).entered, None);
        }
        assert_eq!(tick(&mut controller).entered, Some(Phase::Caution));
        assert_eq!(controller.status().remaining_ms, 3_000);

        for _ in 0..2 {
            assert_eq!(tick(&mut controller).entered, None);
        }
        assert_eq!(tick(&mut controller).entered, Some(Phase::Stop));
        assert_eq!(controller.status().remaining_ms, 10_000);
    }

    #[test]
    fn cycle_repeats_without_drift() {
        let mut controller = Controller::new();
        let mut transitions = Vec::new();

        for i in 1..=69 {
            if let Some(phase) = tick(&mut controller).entered {
                transitions.push((i, phase));
            }
        }

        assert_eq!(
            transitions,
            vec![
                (10, Phase::Go),
                (20, Phase::Caution),
                (23, Phase::Stop),
                (33, Phase::Go),
                (43, Phase::Caution),
                (46, Phase::Stop),
                (56, Phase::Go),
                (66, Phase::Caution),
                (69, Phase::Stop),
            ]
        );
    }

    #[test]
    fn lamps_follow_the_phase() {
        let mut controller = Controller::new();
        assert_eq!(
            (controller.stop_lamp(), controller.go_lamp()),
            (true, false)
        );

        for _ in 0..10 {
            tick(&mut controller);
        }
        assert_eq!(
            (controller.stop_lamp(), controller.go_lamp()),
            (false, true)
        );

        for _ in 0..10 {
            tick(&mut controller);
        }
        // Both heads lit reads amber.
        assert_eq!((controller.stop_lamp(), controller.go_lamp()), (true, true));
    }

    #[test]
    fn press_records_call_and_forces_caution() {
        let mut controller = Controller::new();

        let outcome = press(&mut controller, CallButton::A, 0);

        assert_eq!(outcome.call, Some(CallButton::A));
        assert_eq!(outcome.entered, Some(Phase::Caution));
        assert_eq!(
            controller.status(),
            Status {
                phase: Phase::Caution,
                remaining_ms: 3_000,
                call_pending: true,
                countdown: None,
            }
        );
    }

    #[test]
    fn press_during_caution_only_records() {
        let mut controller = Controller::new();
        for _ in 0..20 {
            tick(&mut controller);
        }
        tick(&mut controller);
        assert_eq!(controller.status().phase, Phase::Caution);
        assert_eq!(controller.status().remaining_ms, 2_000);

        let outcome = press(&mut controller, CallButton::B, 60_000);

        assert_eq!(outcome.call, Some(CallButton::B));
        assert_eq!(outcome.entered, None);
        // The running caution timer is not re-armed by the press.
        assert_eq!(controller.status().remaining_ms, 2_000);
        assert!(controller.status().call_pending);
    }

    #[test]
    fn first_edge_after_boot_is_accepted() {
        let mut controller = Controller::new();

        assert_eq!(
            press(&mut controller, CallButton::A, 0).call,
            Some(CallButton::A)
        );
    }

    #[test]
    fn bounced_edge_is_ignored() {
        let mut controller = Controller::new();
        press(&mut controller, CallButton::A, 0);
        let before = controller.status();

        let bounced = press(&mut controller, CallButton::A, 100);

        assert_eq!(bounced.call, None);
        assert_eq!(bounced.entered, None);
        assert_eq!(bounced.countdown, None);
        assert_eq!(controller.status(), before);

        // Past the window the next edge counts again.
        let accepted = press(&mut controller, CallButton::A, 305);
        assert_eq!(accepted.call, Some(CallButton::A));
    }

    #[test]
    fn bounce_window_does_not_slide_on_ignored_edges() {
        let mut controller = Controller::new();
        press(&mut controller, CallButton::A, 0);

        // A burst of bounces must not push the window out forever: the
        // ignored edge at 200 ms does not reset the reference point, so an
        // edge at 350 ms is already clear of the original press.
        assert_eq!(press(&mut controller, CallButton::A, 200).call, None);
        assert_eq!(
            press(&mut controller, CallButton::A, 350).call,
            Some(CallButton::A)
        );
    }

    #[test]
    fn both_buttons_share_one_debounce_window() {
        let mut controller = Controller::new();

        assert_eq!(
            press(&mut controller, CallButton::A, 0).call,
            Some(CallButton::A)
        );
        assert_eq!(press(&mut controller, CallButton::B, 100).call, None);
    }

    #[test]
    fn countdown_runs_over_the_last_five_seconds_of_stop() {
        let mut controller = Controller::new();
        // Ride the cycle to caution, record a call there, and let the
        // machine roll into stop on its own.
        for _ in 0..20 {
            tick(&mut controller);
        }
        press(&mut controller, CallButton::A, 60_000);
        for _ in 0..3 {
            tick(&mut controller);
        }
        assert_eq!(controller.status().phase, Phase::Stop);
        assert!(controller.status().call_pending);

        // No countdown while more than five seconds remain.
        for expected_remaining in [9_000, 8_000, 7_000, 6_000] {
            let outcome = tick(&mut controller);
            assert_eq!(outcome.countdown, None);
            assert_eq!(controller.status().remaining_ms, expected_remaining);
            assert_eq!(controller.cadence(), Cadence::Off);
        }

        // Crossing the five second mark starts it and consumes the call.
        let outcome = tick(&mut controller);
        assert_eq!(outcome.countdown, Some(5));
        assert!(!controller.status().call_pending);
        assert_eq!(controller.cadence(), Cadence::Slow);

        for (seconds, cadence) in [
            (4, Cadence::Slow),
            (3, Cadence::Slow),
            (2, Cadence::Fast),
            (1, Cadence::Fast),
        ] {
            let outcome = tick(&mut controller);
            assert_eq!(outcome.countdown, Some(seconds));
            assert_eq!(controller.cadence(), cadence);
        }

        // The final tick closes the window and rolls the phase to go.
        let outcome = tick(&mut controller);
        assert_eq!(outcome.countdown, Some(0));
        assert_eq!(outcome.entered, Some(Phase::Go));
        assert_eq!(controller.cadence(), Cadence::Off);
        assert_eq!(
            controller.status(),
            Status {
                phase: Phase::Go,
                remaining_ms: 10_000,
                call_pending: false,
                countdown: None,
            }
        );
    }

    #[test]
    fn no_countdown_without_a_call() {
        let mut controller = Controller::new();

        for _ in 0..10 {
            let outcome = tick(&mut controller);
            assert_eq!(outcome.countdown, None);
            assert_eq!(controller.cadence(), Cadence::Off);
        }
        assert_eq!(controller.status().phase, Phase::Go);
    }

    #[test]
    fn press_during_countdown_kills_it_and_queues_the_next_window() {
        let mut controller = Controller::new();
        for _ in 0..20 {
            tick(&mut controller);
        }
        press(&mut controller, CallButton::A, 60_000);
        for _ in 0..8 {
            tick(&mut controller);
        }
        assert_eq!(controller.status().countdown, Some(5));

        // A fresh press mid-countdown forces caution, which must drop the
        // countdown and silence the alert rather than leave it running.
        let outcome = press(&mut controller, CallButton::B, 61_000);
        assert_eq!(outcome.entered, Some(Phase::Caution));
        assert_eq!(controller.status().countdown, None);
        assert_eq!(controller.cadence(), Cadence::Off);
        assert!(controller.status().call_pending);

        // The recorded call is serviced by the stop phase that follows.
        for _ in 0..3 {
            tick(&mut controller);
        }
        assert_eq!(controller.status().phase, Phase::Stop);
        for _ in 0..4 {
            tick(&mut controller);
        }
        assert_eq!(tick(&mut controller).countdown, Some(5));
    }
}
