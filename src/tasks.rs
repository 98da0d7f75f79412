/*
 * The control tasks that tie the crossing state machine to the hardware.
 *
 * Exactly two things ever mutate the crossing state: the one second phase
 * tick and a button edge. Each runs as its own task and funnels its event
 * through `Controller::handle_event` inside a short critical section.
 * Nothing blocks while the lock is held; all channel traffic happens after
 * it is released.
 *
 * The other two tasks carry no crossing logic. The alert task beats the
 * cadence the controller last asked for onto the alert line, and the
 * display task narrates status frames for whoever is listening on the
 * debug channel.
 */

use core::cell::RefCell;

use defmt::{debug, info};
use embassy_futures::select::{Either, select};
use embassy_sync::{
    blocking_mutex::{
        Mutex,
        raw::{CriticalSectionRawMutex, ThreadModeRawMutex},
    },
    channel::{Channel, Receiver, Sender},
};
use embassy_time::{Duration, Ticker, Timer};

use crate::alert::{AlertPulser, Cadence, TICK_HZ};
use crate::controller::{Controller, Event, Outcome, Status, TICK_PERIOD_MS};
use crate::io::{CHANNEL_CAPACITY, Line, RawEdge, SetLevel};

type CrossingState = Mutex<CriticalSectionRawMutex, RefCell<Controller>>;
static CROSSING_STATE: CrossingState = Mutex::new(RefCell::new(Controller::new()));

pub static LEVELS: Channel<ThreadModeRawMutex, SetLevel, CHANNEL_CAPACITY> = Channel::new();
pub static EDGES: Channel<ThreadModeRawMutex, RawEdge, CHANNEL_CAPACITY> = Channel::new();
pub static CADENCES: Channel<ThreadModeRawMutex, Cadence, CHANNEL_CAPACITY> = Channel::new();
pub static FRAMES: Channel<ThreadModeRawMutex, Status, CHANNEL_CAPACITY> = Channel::new();

pub type LevelSender = Sender<'static, ThreadModeRawMutex, SetLevel, CHANNEL_CAPACITY>;
pub type EdgeReceiver = Receiver<'static, ThreadModeRawMutex, RawEdge, CHANNEL_CAPACITY>;
pub type CadenceSender = Sender<'static, ThreadModeRawMutex, Cadence, CHANNEL_CAPACITY>;
pub type CadenceReceiver = Receiver<'static, ThreadModeRawMutex, Cadence, CHANNEL_CAPACITY>;
pub type FrameSender = Sender<'static, ThreadModeRawMutex, Status, CHANNEL_CAPACITY>;
pub type FrameReceiver = Receiver<'static, ThreadModeRawMutex, Status, CHANNEL_CAPACITY>;

/// Everything the outside world may need to hear about after one event.
struct Update {
    outcome: Outcome,
    stop_lamp: bool,
    go_lamp: bool,
    cadence: Cadence,
    status: Status,
}

fn project(controller: &Controller, outcome: Outcome) -> Update {
    Update {
        outcome,
        stop_lamp: controller.stop_lamp(),
        go_lamp: controller.go_lamp(),
        cadence: controller.cadence(),
        status: controller.status(),
    }
}

fn dispatch(event: Event) -> Update {
    CROSSING_STATE.lock(|state| {
        let mut controller = state.borrow_mut();
        let outcome = controller.handle_event(event);
        project(&controller, outcome)
    })
}

async fn publish(
    update: Update,
    levels: LevelSender,
    cadences: CadenceSender,
    frames: FrameSender,
) {
    if let Some(phase) = update.outcome.entered {
        info!("phase: {} for {} ms", phase, phase.duration_ms());
        levels
            .send(SetLevel {
                line: Line::Stop,
                on: update.stop_lamp,
            })
            .await;
        levels
            .send(SetLevel {
                line: Line::Go,
                on: update.go_lamp,
            })
            .await;
    }
    if let Some(button) = update.outcome.call {
        info!("pedestrian call from button {}", button);
    }
    if let Some(seconds) = update.outcome.countdown {
        info!("crossing window: {} s left", seconds);
    }

    // The alert task ignores repeats, so the current cadence goes out after
    // every event unconditionally.
    cadences.send(update.cadence).await;

    // Status frames are informational. If the display falls behind, drop
    // the frame rather than stall a handler on it.
    let _ = frames.try_send(update.status);
}

#[embassy_executor::task]
pub async fn tick_task(levels: LevelSender, cadences: CadenceSender, frames: FrameSender) -> ! {
    // Drive the stop visual before the first tick so the heads never sit
    // dark waiting for a transition.
    let initial = CROSSING_STATE.lock(|state| {
        let controller = state.borrow();
        let phase = controller.status().phase;
        project(
            &controller,
            Outcome {
                entered: Some(phase),
                ..Outcome::default()
            },
        )
    });
    publish(initial, levels, cadences, frames).await;

    let mut ticker = Ticker::every(Duration::from_millis(TICK_PERIOD_MS as u64));
    loop {
        ticker.next().await;
        let update = dispatch(Event::Tick {
            elapsed_ms: TICK_PERIOD_MS,
        });
        publish(update, levels, cadences, frames).await;
    }
}

#[embassy_executor::task]
pub async fn edge_task(
    edges: EdgeReceiver,
    levels: LevelSender,
    cadences: CadenceSender,
    frames: FrameSender,
) -> ! {
    loop {
        let RawEdge {
            button,
            timestamp_us,
        } = edges.receive().await;

        let update = dispatch(Event::ButtonEdge {
            button,
            timestamp_us,
        });
        if update.outcome.call.is_none() {
            debug!("edge from button {} inside the debounce window, dropped", button);
        }
        publish(update, levels, cadences, frames).await;
    }
}

#[embassy_executor::task]
pub async fn alert_task(cadences: CadenceReceiver, levels: LevelSender) -> ! {
    let mut pulser = AlertPulser::new();
    let mut line_on = false;

    loop {
        if pulser.cadence() == Cadence::Off {
            // Force the line low once, then sleep until someone wants a
            // beat again. No ticking while the crossing is quiet.
            if line_on {
                line_on = false;
                levels
                    .send(SetLevel {
                        line: Line::Alert,
                        on: false,
                    })
                    .await;
            }
            pulser.set_cadence(cadences.receive().await);
            continue;
        }

        match select(
            cadences.receive(),
            Timer::after(Duration::from_hz(TICK_HZ as u64)),
        )
        .await
        {
            Either::First(cadence) => pulser.set_cadence(cadence),
            Either::Second(_) => {
                let on = pulser.call_at_100_hz();
                if on != line_on {
                    line_on = on;
                    levels.send(SetLevel { line: Line::Alert, on }).await;
                }
            }
        }
    }
}

#[embassy_executor::task]
pub async fn display_task(frames: FrameReceiver) -> ! {
    loop {
        let status = frames.receive().await;
        match status.countdown {
            Some(seconds) => debug!(
                "{} | {} ms left | call pending: {} | crossing window: {} s",
                status.phase, status.remaining_ms, status.call_pending, seconds
            ),
            None => debug!(
                "{} | {} ms left | call pending: {}",
                status.phase, status.remaining_ms, status.call_pending
            ),
        }
    }
}
