/*
 * The distance sampler.
 *
 * Each lane has an HC-SR04 style ultrasonic sensor: a short pulse on the
 * trigger line asks for one ranging cycle, and the sensor answers by holding
 * the echo line high for as long as the sound took to come back. 58 us of
 * echo is one centimetre of distance.
 *
 * Every wait on the echo line is raced against a timeout. A sensor that is
 * unplugged or wired wrong costs one timeout per sample and reads as nothing
 * in range; the other lane is still measured.
 */

use core::fmt;
use embassy_futures::select::{Either, select};
use embassy_time::Duration;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use enum_ordinalize::Ordinalize;

use crate::lane::Lane;
use crate::presence::{Detections, FaultChange};
use crate::stopwatch::{Clock, Stopwatch};
use crate::timing::{ECHO_US_PER_CM, IN_RANGE_CM, TRIGGER_PULSE};

/// The outcome of one ranging cycle.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Reading {
    /// Distance in centimetres.
    Range(f32),
    /// The echo line never went high.
    NoEcho,
    /// The echo line went high and never came back down.
    EchoStuck,
}

impl Reading {
    pub fn detected(&self) -> bool {
        match *self {
            Reading::Range(distance_cm) => in_range(distance_cm),
            Reading::NoEcho | Reading::EchoStuck => false,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Reading::NoEcho | Reading::EchoStuck)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Range(distance_cm) => write!(f, "{distance_cm:.1} cm"),
            Reading::NoEcho => f.write_str("no echo"),
            Reading::EchoStuck => f.write_str("echo stuck high"),
        }
    }
}

pub fn distance_cm(echo: Duration) -> f32 {
    echo.as_micros() as f32 / ECHO_US_PER_CM
}

pub fn in_range(distance_cm: f32) -> bool {
    distance_cm <= IN_RANGE_CM
}

pub struct SensorChannel<T, E> {
    trigger: T,
    echo: E,
}

impl<T, E> SensorChannel<T, E>
where
    T: OutputPin,
    E: Wait<Error = T::Error>,
{
    pub fn new(trigger: T, echo: E) -> Self {
        SensorChannel { trigger, echo }
    }

    pub async fn measure<D: DelayNs, C: Clock>(
        &mut self,
        delay: &mut D,
        clock: &C,
        timeout: Duration,
    ) -> Result<Reading, T::Error> {
        let mut stopwatch = Stopwatch::new();
        let timeout_us = saturating_micros(timeout);

        // A cycle that timed out earlier may still hold the echo high. It has
        // to end before a new cycle is requested, or its tail would be timed
        // as a fresh echo.
        match select(self.echo.wait_for_low(), delay.delay_us(timeout_us)).await {
            Either::First(result) => result?,
            Either::Second(()) => return Ok(Reading::EchoStuck),
        }

        self.trigger.set_high()?;
        delay.delay_us(saturating_micros(TRIGGER_PULSE)).await;
        self.trigger.set_low()?;

        match select(self.echo.wait_for_rising_edge(), delay.delay_us(timeout_us)).await {
            Either::First(result) => result?,
            Either::Second(()) => return Ok(Reading::NoEcho),
        }
        stopwatch.start(clock.now());

        match select(self.echo.wait_for_low(), delay.delay_us(timeout_us)).await {
            Either::First(result) => result?,
            Either::Second(()) => return Ok(Reading::EchoStuck),
        }
        stopwatch.stop(clock.now());

        Ok(Reading::Range(distance_cm(stopwatch.elapsed(clock.now()))))
    }
}

// `DelayNs` counts in `u32` microseconds. Longer waits are clamped.
fn saturating_micros(duration: Duration) -> u32 {
    u32::try_from(duration.as_micros()).unwrap_or(u32::MAX)
}

/// One complete pass over both lanes.
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct Sample {
    pub readings: [Reading; Lane::VARIANT_COUNT],
    pub faults: [FaultChange; Lane::VARIANT_COUNT],
}

impl Sample {
    pub fn reading(&self, lane: Lane) -> Reading {
        self.readings[lane.ordinal()]
    }

    pub fn fault(&self, lane: Lane) -> FaultChange {
        self.faults[lane.ordinal()]
    }
}

pub struct DistanceSampler<T, E, D, C> {
    // Indexed by `Lane::ordinal`.
    channels: [SensorChannel<T, E>; Lane::VARIANT_COUNT],
    delay: D,
    clock: C,
    echo_timeout: Duration,
}

impl<T, E, D, C> DistanceSampler<T, E, D, C>
where
    T: OutputPin,
    E: Wait<Error = T::Error>,
    D: DelayNs,
    C: Clock,
{
    pub fn new(
        red: SensorChannel<T, E>,
        blue: SensorChannel<T, E>,
        delay: D,
        clock: C,
        echo_timeout: Duration,
    ) -> Self {
        DistanceSampler {
            channels: [red, blue],
            delay,
            clock,
            echo_timeout,
        }
    }

    /*
     * Measures the lanes one after the other, red first, and publishes each
     * reading as soon as it is taken.
     */
    pub async fn sample(&mut self, detections: &Detections) -> Result<Sample, T::Error> {
        let mut sample = Sample {
            readings: [Reading::NoEcho; Lane::VARIANT_COUNT],
            faults: [FaultChange::Unchanged; Lane::VARIANT_COUNT],
        };

        for lane in Lane::VARIANTS.iter().copied() {
            let i = lane.ordinal();
            let reading = self.channels[i]
                .measure(&mut self.delay, &self.clock, self.echo_timeout)
                .await?;
            sample.readings[i] = reading;
            sample.faults[i] = detections.publish(lane, reading);
        }

        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;
    use core::future::poll_fn;
    use core::task::Poll;
    use embassy_futures::block_on;
    use embassy_time::Instant;
    use embedded_hal::digital::ErrorType;

    // Simulated time in microseconds. Only the fake delay moves it forward.
    #[derive(Default)]
    struct SimTime {
        now_us: Cell<u64>,
        triggered: RefCell<Vec<&'static str>>,
    }

    impl SimTime {
        fn now(&self) -> u64 {
            self.now_us.get()
        }

        fn advance_to(&self, micros: u64) {
            self.now_us.set(micros);
        }
    }

    impl Clock for &SimTime {
        fn now(&self) -> Instant {
            Instant::from_micros(self.now_us.get())
        }
    }

    // How the sensor answers one trigger.
    #[derive(Clone, Copy)]
    enum Echo {
        Pulse(u64),
        Silent,
        StuckHigh,
    }

    // The sensor starts its echo 450 us after the trigger drops. It ignores
    // triggers while its echo line is still high.
    const ECHO_LATENCY_US: u64 = 450;

    struct Sensor<'a> {
        time: &'a SimTime,
        name: &'static str,
        // One answer per trigger; the last one repeats.
        answers: Vec<Echo>,
        answered: Cell<usize>,
        // (rise, fall) of every echo so far, in simulated microseconds.
        pulses: RefCell<Vec<(u64, Option<u64>)>>,
    }

    impl<'a> Sensor<'a> {
        fn new(time: &'a SimTime, name: &'static str, answers: &[Echo]) -> Self {
            Sensor {
                time,
                name,
                answers: answers.to_vec(),
                answered: Cell::new(0),
                pulses: RefCell::new(Vec::new()),
            }
        }

        fn echo_high(&self) -> bool {
            let now = self.time.now();
            self.pulses
                .borrow()
                .iter()
                .any(|&(rise, fall)| rise <= now && fall.is_none_or(|fall| now < fall))
        }

        fn triggered(&self) {
            if self.echo_high() {
                return;
            }
            let i = self.answered.get().min(self.answers.len() - 1);
            self.answered.set(self.answered.get() + 1);
            let rise = self.time.now() + ECHO_LATENCY_US;
            match self.answers[i] {
                Echo::Pulse(width_us) => {
                    self.pulses.borrow_mut().push((rise, Some(rise + width_us)));
                }
                Echo::StuckHigh => self.pulses.borrow_mut().push((rise, None)),
                Echo::Silent => {}
            }
        }

        fn channel(&self) -> SensorChannel<Trigger<'_>, EchoLine<'_>> {
            SensorChannel::new(Trigger(self), EchoLine(self))
        }
    }

    struct Trigger<'a>(&'a Sensor<'a>);

    impl ErrorType for Trigger<'_> {
        type Error = Infallible;
    }

    impl OutputPin for Trigger<'_> {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.triggered();
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.time.triggered.borrow_mut().push(self.0.name);
            Ok(())
        }
    }

    struct EchoLine<'a>(&'a Sensor<'a>);

    impl EchoLine<'_> {
        // Re-checks the line on every poll. `block_on` keeps polling, and the
        // delay racing against this moves time on in between.
        async fn wait_until(&self, mut done: impl FnMut(bool) -> bool) -> Result<(), Infallible> {
            poll_fn(|cx| {
                if done(self.0.echo_high()) {
                    Poll::Ready(Ok(()))
                } else {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            })
            .await
        }
    }

    impl ErrorType for EchoLine<'_> {
        type Error = Infallible;
    }

    impl Wait for EchoLine<'_> {
        async fn wait_for_high(&mut self) -> Result<(), Infallible> {
            self.wait_until(|high| high).await
        }

        async fn wait_for_low(&mut self) -> Result<(), Infallible> {
            self.wait_until(|high| !high).await
        }

        async fn wait_for_rising_edge(&mut self) -> Result<(), Infallible> {
            let mut seen_low = false;
            self.wait_until(|high| {
                seen_low |= !high;
                seen_low && high
            })
            .await
        }

        async fn wait_for_falling_edge(&mut self) -> Result<(), Infallible> {
            let mut seen_high = false;
            self.wait_until(|high| {
                seen_high |= high;
                seen_high && !high
            })
            .await
        }

        async fn wait_for_any_edge(&mut self) -> Result<(), Infallible> {
            let mut first = None;
            self.wait_until(|high| *first.get_or_insert(high) != high).await
        }
    }

    // Moves simulated time on by one microsecond per poll.
    struct Delay<'a> {
        time: &'a SimTime,
    }

    impl DelayNs for Delay<'_> {
        async fn delay_ns(&mut self, ns: u32) {
            let mut remaining_us = u64::from(ns) / 1_000;
            poll_fn(|cx| {
                if remaining_us == 0 {
                    return Poll::Ready(());
                }
                self.time.advance_to(self.time.now() + 1);
                remaining_us -= 1;
                cx.waker().wake_by_ref();
                Poll::Pending
            })
            .await
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(40);

    fn measure_with(time: &SimTime, sensor: &Sensor<'_>) -> Reading {
        let mut channel = sensor.channel();
        let mut delay = Delay { time };
        block_on(channel.measure(&mut delay, &time, TIMEOUT)).unwrap()
    }

    fn measure(echo: Echo) -> Reading {
        let time = SimTime::default();
        let sensor = Sensor::new(&time, "sensor", &[echo]);
        measure_with(&time, &sensor)
    }

    #[test]
    fn conversion_is_58_us_per_cm() {
        assert_eq!(distance_cm(Duration::from_micros(580)), 10.0);
        assert_eq!(distance_cm(Duration::from_micros(1_160)), 20.0);
        assert_eq!(distance_cm(Duration::from_micros(0)), 0.0);
    }

    #[test]
    fn range_boundary_is_inclusive() {
        assert!(in_range(distance_cm(Duration::from_micros(580))));
        assert!(!in_range(distance_cm(Duration::from_micros(581))));
    }

    #[test]
    fn echo_pulse_is_timed_from_rise_to_fall() {
        assert_eq!(measure(Echo::Pulse(580)), Reading::Range(10.0));
        assert!(measure(Echo::Pulse(580)).detected());
        assert!(!measure(Echo::Pulse(581)).detected());
        assert!(measure(Echo::Pulse(120)).detected());
    }

    #[test]
    fn silent_sensor_times_out_as_no_echo() {
        let reading = measure(Echo::Silent);
        assert_eq!(reading, Reading::NoEcho);
        assert!(!reading.detected());
        assert!(reading.is_fault());
    }

    #[test]
    fn echo_that_never_drops_times_out_as_stuck() {
        let reading = measure(Echo::StuckHigh);
        assert_eq!(reading, Reading::EchoStuck);
        assert!(!reading.detected());
    }

    #[test]
    fn tail_of_a_timed_out_echo_is_not_a_new_reading() {
        // The first echo runs for 60 ms, past the 40 ms timeout. The next
        // measurement starts with 290 us of it left, which would read as
        // 5 cm if it were timed.
        let time = SimTime::default();
        let sensor = Sensor::new(&time, "sensor", &[Echo::Pulse(60_000), Echo::Pulse(5_800)]);

        assert_eq!(measure_with(&time, &sensor), Reading::EchoStuck);

        time.advance_to(ECHO_LATENCY_US + 10 + 60_000 - 290);
        assert!(sensor.echo_high());
        let second = measure_with(&time, &sensor);
        assert_eq!(second, Reading::Range(100.0));
        assert!(!second.detected());
    }

    #[test]
    fn echo_still_high_from_before_reads_as_stuck() {
        let time = SimTime::default();
        let sensor = Sensor::new(&time, "sensor", &[Echo::StuckHigh]);

        assert_eq!(measure_with(&time, &sensor), Reading::EchoStuck);
        let second = measure_with(&time, &sensor);
        assert_eq!(second, Reading::EchoStuck);
        assert!(!second.detected());
        assert_eq!(sensor.answered.get(), 1, "no new cycle while the echo is high");
    }

    #[test]
    fn long_timeouts_saturate_instead_of_wrapping() {
        assert_eq!(saturating_micros(Duration::from_millis(40)), 40_000);
        assert_eq!(saturating_micros(Duration::from_secs(5_000)), u32::MAX);
    }

    #[test]
    fn sample_measures_red_then_blue_and_publishes_both() {
        let time = SimTime::default();
        let red = Sensor::new(&time, "red", &[Echo::Pulse(300)]);
        let blue = Sensor::new(&time, "blue", &[Echo::Pulse(5_000)]);
        let detections = Detections::new();
        let delay = Delay { time: &time };
        let mut sampler =
            DistanceSampler::new(red.channel(), blue.channel(), delay, &time, TIMEOUT);

        let sample = block_on(sampler.sample(&detections)).unwrap();

        assert_eq!(*time.triggered.borrow(), ["red", "blue"]);
        assert!(sample.reading(Lane::Red).detected());
        assert!(!sample.reading(Lane::Blue).detected());
        assert!(detections.detected(Lane::Red));
        assert!(!detections.detected(Lane::Blue));
    }

    #[test]
    fn dead_sensor_does_not_hold_up_the_other_lane() {
        let time = SimTime::default();
        let red = Sensor::new(&time, "red", &[Echo::Silent]);
        let blue = Sensor::new(&time, "blue", &[Echo::Pulse(200)]);
        let detections = Detections::new();
        let delay = Delay { time: &time };
        let mut sampler =
            DistanceSampler::new(red.channel(), blue.channel(), delay, &time, TIMEOUT);

        let sample = block_on(sampler.sample(&detections)).unwrap();

        assert_eq!(sample.reading(Lane::Red), Reading::NoEcho);
        assert_eq!(sample.fault(Lane::Red), FaultChange::Raised);
        assert_eq!(sample.fault(Lane::Blue), FaultChange::Unchanged);
        assert!(detections.faulted(Lane::Red));
        assert!(detections.detected(Lane::Blue));
    }

    #[test]
    fn reading_text() {
        assert_eq!(Reading::Range(12.34).to_string(), "12.3 cm");
        assert_eq!(Reading::NoEcho.to_string(), "no echo");
        assert_eq!(Reading::EchoStuck.to_string(), "echo stuck high");
    }
}
