/*
 * The I/O module for the intersection.
 *
 * This module holds the tasks that touch the device: the sampler task that
 * drives the two ultrasonic sensors, and the log task that owns the USART.
 * Together with the pin mapping in `main` this is the only part of the
 * program that is device-specific.
 *
 * The tasks talk to the rest of the program through the shared detection
 * flags and a channel of diagnostics.
 */

use core::fmt::{self, Write};
use embassy_stm32::{exti::ExtiInput, gpio::Output, mode::Async, usart::Uart};
use embassy_sync::{
    blocking_mutex::raw::ThreadModeRawMutex,
    channel::{Receiver, Sender},
};
use embassy_time::{Delay, Duration, Instant, Ticker};
use enum_ordinalize::Ordinalize;
use heapless::String;
use twolane_arbiter::{Clock, Detections, DistanceSampler, FaultChange, Lane, Reading, Transition};

pub const CHANNEL_CAPACITY: usize = 4;
const LINE_CAPACITY: usize = 64;

#[derive(Copy, Clone)]
pub enum Diagnostic {
    Transition(Transition),
    SensorFault(Lane, Reading),
    SensorRecovered(Lane),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Transition(transition) => write!(f, "{transition}"),
            Diagnostic::SensorFault(lane, reading) => write!(f, "{lane} sensor: {reading}"),
            Diagnostic::SensorRecovered(lane) => write!(f, "{lane} sensor: ok"),
        }
    }
}

pub type DiagnosticSender = Sender<'static, ThreadModeRawMutex, Diagnostic, CHANNEL_CAPACITY>;
pub type DiagnosticReceiver = Receiver<'static, ThreadModeRawMutex, Diagnostic, CHANNEL_CAPACITY>;

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub type Sampler = DistanceSampler<Output<'static>, ExtiInput<'static>, Delay, SystemClock>;

#[embassy_executor::task]
pub async fn sampler_task(
    mut sampler: Sampler,
    detections: &'static Detections,
    diagnostics: DiagnosticSender,
    period: Duration,
) -> ! {
    let mut ticker = Ticker::every(period);

    loop {
        let Ok(sample) = sampler.sample(detections).await;

        for lane in Lane::VARIANTS.iter().copied() {
            match sample.fault(lane) {
                FaultChange::Raised => {
                    diagnostics
                        .send(Diagnostic::SensorFault(lane, sample.reading(lane)))
                        .await
                }
                FaultChange::Cleared => diagnostics.send(Diagnostic::SensorRecovered(lane)).await,
                FaultChange::Unchanged => {}
            }
        }

        ticker.next().await;
    }
}

#[embassy_executor::task]
pub async fn log_task(mut usart: Uart<'static, Async>, diagnostics: DiagnosticReceiver) -> ! {
    let mut line: String<LINE_CAPACITY> = String::new();

    loop {
        let diagnostic = diagnostics.receive().await;

        line.clear();
        if writeln!(line, "{diagnostic}").is_ok() {
            // A failed write loses this one line and nothing else.
            let _ = usart.write(line.as_bytes()).await;
        }
    }
}
