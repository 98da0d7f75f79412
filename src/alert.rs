/*
 * The crossing alert is not a continuous tone but a beat: a lazy half
 * second flip while there is still time to cross, an urgent fifth of a
 * second flip when the window is nearly shut. Programming beats with
 * explicit waits scatters timing through the control logic and makes the
 * exact flip moments depend on whatever else the code was doing. In an
 * analog world this would just be a free-running timer bus that we AND
 * into the output.
 *
 * This module brings that simplicity back. The control logic only states
 * which beat it wants (off, slow or fast); the pulser turns a running
 * tick count into line levels. In order to keep this module testable we
 * keep all time and delay functions outside the module: the owner calls
 * `call_at_100_hz` on its own schedule and writes the returned level to
 * the line, and a test can step the beat without any waiting.
 */

/// The beat the alert line carries while a crossing countdown runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cadence {
    Off,
    /// Level flips every 500 ms.
    Slow,
    /// Level flips every 200 ms.
    Fast,
}

/// Rate the owner is expected to call [`AlertPulser::call_at_100_hz`] at.
pub const TICK_HZ: u32 = 100;

const SLOW_TOGGLE_TICKS: u8 = 50;
const FAST_TOGGLE_TICKS: u8 = 20;
const TICKS_PER_CYCLE: u8 = 200;

// The wrap point has to land on a flip boundary of both beats, or the
// line would stutter once per cycle.
const _: () = assert!(TICKS_PER_CYCLE % (2 * SLOW_TOGGLE_TICKS) == 0);
const _: () = assert!(TICKS_PER_CYCLE % (2 * FAST_TOGGLE_TICKS) == 0);

pub struct AlertPulser {
    cadence: Cadence,
    tick_count: u8,
}

impl AlertPulser {
    pub const fn new() -> Self {
        AlertPulser {
            cadence: Cadence::Off,
            tick_count: TICKS_PER_CYCLE - 1,
        }
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /*
     * Switching beats restarts the cycle, so the first pulse of a new beat
     * is a full one that starts on the very next tick. Re-sending the
     * cadence that is already playing is a no-op and leaves the beat phase
     * alone, so the owner may repeat its current wish freely.
     */
    pub fn set_cadence(&mut self, cadence: Cadence) {
        if cadence != self.cadence {
            self.cadence = cadence;
            self.tick_count = TICKS_PER_CYCLE - 1;
        }
    }

    pub fn call_at_100_hz(&mut self) -> bool {
        self.tick_count = (self.tick_count + 1) % TICKS_PER_CYCLE;

        match self.cadence {
            Cadence::Off => false,
            Cadence::Slow => (self.tick_count / SLOW_TOGGLE_TICKS) % 2 == 0,
            Cadence::Fast => (self.tick_count / FAST_TOGGLE_TICKS) % 2 == 0,
        }
    }
}
