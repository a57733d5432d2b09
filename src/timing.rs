use embassy_time::Duration;

/// Detection range of the ultrasonic sensors, inclusive.
pub const IN_RANGE_CM: f32 = 10.0;

/// Round-trip echo time per centimetre of distance, in microseconds.
pub const ECHO_US_PER_CM: f32 = 58.0;

/// Length of the pulse on the trigger line that requests one ranging cycle.
pub const TRIGGER_PULSE: Duration = Duration::from_micros(10);

/*
 * All the timing knobs of the intersection in one place.
 *
 * The red lane gets the longer contest cap: when both approaches have traffic
 * it holds green for up to two minutes, the blue lane for only one.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub red_contest_cap: Duration,
    pub blue_contest_cap: Duration,
    pub yellow: Duration,
    pub all_red: Duration,
    pub tick_period: Duration,
    pub sample_period: Duration,
    // An HC-SR04 holds the echo high for about 38 ms when nothing is in range.
    pub echo_timeout: Duration,
}

impl Timing {
    pub const DEFAULT: Timing = Timing {
        red_contest_cap: Duration::from_secs(120),
        blue_contest_cap: Duration::from_secs(60),
        yellow: Duration::from_secs(5),
        all_red: Duration::from_secs(5),
        tick_period: Duration::from_millis(100),
        sample_period: Duration::from_millis(100),
        echo_timeout: Duration::from_millis(40),
    };
}

impl Default for Timing {
    fn default() -> Self {
        Self::DEFAULT
    }
}
