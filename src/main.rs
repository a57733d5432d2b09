#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_stm32::exti::{Channel as _, ExtiInput};
use embassy_stm32::gpio::{Level, Output, Pin, Pull, Speed};
use embassy_stm32::usart::{Config, Uart};
use embassy_stm32::{bind_interrupts, peripherals, usart};
use embassy_sync::{blocking_mutex::raw::ThreadModeRawMutex, channel::Channel};
use embassy_time::{Delay, Instant, Timer};
use panic_halt as _;
use twolane_arbiter::{
    Arbiter, Detections, DistanceSampler, Lane, SensorChannel, SignalHead, Timing,
};

mod io;
use io::{CHANNEL_CAPACITY, Diagnostic, SystemClock};

static DETECTIONS: Detections = Detections::new();
static DIAGNOSTICS: Channel<ThreadModeRawMutex, Diagnostic, CHANNEL_CAPACITY> = Channel::new();

bind_interrupts!(struct Irqs {
    USART1 => usart::InterruptHandler<peripherals::USART1>;
});

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let peripherals = embassy_stm32::init(Default::default());
    let timing = Timing::DEFAULT;

    let usart = Uart::new(
        peripherals.USART1,
        peripherals.PA10,
        peripherals.PA9,
        Irqs,
        peripherals.DMA1_CH4,
        peripherals.DMA1_CH5,
        Config::default(), // 115200 baud
    )
    .unwrap();
    spawner.must_spawn(io::log_task(usart, DIAGNOSTICS.receiver()));

    // Lamp lines are ordered green, yellow, red. Both heads power up on red.
    let mut red_head = SignalHead::new(
        [
            Output::new(peripherals.PB7.degrade(), Level::Low, Speed::Low),
            Output::new(peripherals.PB9.degrade(), Level::Low, Speed::Low),
            Output::new(peripherals.PE1.degrade(), Level::High, Speed::Low),
        ],
        false,
    );
    let mut blue_head = SignalHead::new(
        [
            Output::new(peripherals.PE0.degrade(), Level::Low, Speed::Low),
            Output::new(peripherals.PB8.degrade(), Level::Low, Speed::Low),
            Output::new(peripherals.PB6.degrade(), Level::High, Speed::Low),
        ],
        false,
    );

    let sampler = DistanceSampler::new(
        SensorChannel::new(
            Output::new(peripherals.PE4.degrade(), Level::Low, Speed::Low),
            ExtiInput::new(
                peripherals.PE2.degrade(),
                peripherals.EXTI2.degrade(),
                Pull::Down,
            ),
        ),
        SensorChannel::new(
            Output::new(peripherals.PE5.degrade(), Level::Low, Speed::Low),
            ExtiInput::new(
                peripherals.PE3.degrade(),
                peripherals.EXTI3.degrade(),
                Pull::Down,
            ),
        ),
        Delay,
        SystemClock,
        timing.echo_timeout,
    );
    spawner.must_spawn(io::sampler_task(
        sampler,
        &DETECTIONS,
        DIAGNOSTICS.sender(),
        timing.sample_period,
    ));

    let mut arbiter = Arbiter::new(&timing);
    let diagnostics = DIAGNOSTICS.sender();

    loop {
        let tick = arbiter.tick(Instant::now(), DETECTIONS.presence());

        if let Some(aspects) = tick.aspects {
            let Ok(()) = red_head.show(aspects.lane(Lane::Red));
            let Ok(()) = blue_head.show(aspects.lane(Lane::Blue));
        }

        // The control loop never waits for the log. A full queue drops the line.
        if let Some(transition) = tick.transition {
            let _ = diagnostics.try_send(Diagnostic::Transition(transition));
        }

        Timer::after(timing.tick_period).await;
    }
}
