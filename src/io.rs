/*
 * The I/O module for the crossing hardware.
 *
 * This module implements a task that is responsible for controlling the
 * actual I/O pins on the device. The intention is for this module to be
 * the only part of the program that is device-specific. Level commands
 * for the output lines flow in over a channel, raw button edges flow out
 * over another, stamped with their arrival time.
 *
 * Edges are forwarded raw on purpose. Whether two edges are one press is
 * a policy question, and policy lives in the controller where it can be
 * tested; this task only reports what the pins did and when.
 */

use embassy_futures::select::{Either3, select3};
use embassy_stm32::{
    exti::ExtiInput,
    gpio::{Level, Output},
};
use embassy_sync::{
    blocking_mutex::raw::ThreadModeRawMutex,
    channel::{Receiver, Sender},
};
use embassy_time::Instant;
use enum_ordinalize::Ordinalize;

use crate::controller::CallButton;

pub const CHANNEL_CAPACITY: usize = 4;

/// The output lines of the crossing, in pin array order.
#[derive(Ordinalize, Clone, Copy)]
#[repr(usize)]
pub enum Line {
    /// Red head. Lit alone for stop, together with `Go` for caution.
    Stop,
    /// Green head.
    Go,
    /// Crossing alert. The crossing PCB routes this to a sounder; the
    /// bench board has no sounder fitted, so there it drives the amber
    /// head instead.
    Alert,
}

/// A level command for one output line.
#[derive(Clone, Copy)]
pub struct SetLevel {
    pub line: Line,
    pub on: bool,
}

/// One raw falling edge from a call button, stamped on arrival.
#[derive(Clone, Copy)]
pub struct RawEdge {
    pub button: CallButton,
    pub timestamp_us: u64,
}

#[embassy_executor::task]
pub async fn io_task(
    mut lines: [Output<'static>; Line::VARIANT_COUNT],
    mut button_a: ExtiInput<'static>,
    mut button_b: ExtiInput<'static>,
    levels: Receiver<'static, ThreadModeRawMutex, SetLevel, CHANNEL_CAPACITY>,
    edges: Sender<'static, ThreadModeRawMutex, RawEdge, CHANNEL_CAPACITY>,
) -> ! {
    loop {
        match select3(
            levels.receive(),
            button_a.wait_for_falling_edge(),
            button_b.wait_for_falling_edge(),
        )
        .await
        {
            Either3::First(SetLevel { line, on }) => {
                // The heads are wired active-high, so `true` means lit.
                lines[line.ordinal()].set_level(if on { Level::High } else { Level::Low });
            }
            Either3::Second(_) => {
                edges
                    .send(RawEdge {
                        button: CallButton::A,
                        timestamp_us: Instant::now().as_micros(),
                    })
                    .await
            }
            Either3::Third(_) => {
                edges
                    .send(RawEdge {
                        button: CallButton::B,
                        timestamp_us: Instant::now().as_micros(),
                    })
                    .await
            }
        }
    }
}
