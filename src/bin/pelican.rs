#![no_std]
#![no_main]

use defmt::info;
use embassy_executor::Spawner;
use embassy_stm32::exti::{Channel, ExtiInput};
use embassy_stm32::gpio::{Level, Output, Pin, Pull, Speed};
use embassy_time::Timer;
use {defmt_rtt as _, panic_probe as _};

use pelican::io::io_task;
use pelican::tasks::{
    CADENCES, EDGES, FRAMES, LEVELS, alert_task, display_task, edge_task, tick_task,
};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let peripherals = embassy_stm32::init(Default::default());

    // Indexed by `Line` ordinal. On the bench board all three drive LED
    // heads; on the crossing PCB the alert line drives the sounder.
    let mut lines = [
        Output::new(peripherals.PB10.degrade(), Level::Low, Speed::Low), // Line::Stop
        Output::new(peripherals.PB14.degrade(), Level::Low, Speed::Low), // Line::Go
        Output::new(peripherals.PB12.degrade(), Level::Low, Speed::Low), // Line::Alert
    ];

    // One call button on each kerb. Both report the same crossing.
    let button_a = ExtiInput::new(
        peripherals.PE11.degrade(),
        peripherals.EXTI11.degrade(),
        Pull::Up,
    );
    let button_b = ExtiInput::new(
        peripherals.PE10.degrade(),
        peripherals.EXTI10.degrade(),
        Pull::Up,
    );

    // Power-on bulb check. A dead head is easier to spot here than during
    // whatever phase it happens to sit dark in.
    for line in lines.iter_mut() {
        line.set_level(Level::High);
    }
    Timer::after_millis(500).await;
    for line in lines.iter_mut() {
        line.set_level(Level::Low);
    }

    info!("pelican crossing controller up");

    spawner
        .spawn(io_task(
            lines,
            button_a,
            button_b,
            LEVELS.receiver(),
            EDGES.sender(),
        ))
        .unwrap();
    spawner
        .spawn(tick_task(
            LEVELS.sender(),
            CADENCES.sender(),
            FRAMES.sender(),
        ))
        .unwrap();
    spawner
        .spawn(edge_task(
            EDGES.receiver(),
            LEVELS.sender(),
            CADENCES.sender(),
            FRAMES.sender(),
        ))
        .unwrap();
    spawner
        .spawn(alert_task(CADENCES.receiver(), LEVELS.sender()))
        .unwrap();
    spawner.spawn(display_task(FRAMES.receiver())).unwrap();
}
