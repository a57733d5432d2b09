#![cfg_attr(not(test), no_std)]

/*
 * Arbitration for a two-lane intersection with an ultrasonic presence sensor
 * on each approach.
 *
 * Everything in this crate is free of device specifics and runs on the host.
 * The firmware binary (`src/main.rs`, behind the `firmware` feature) wires it
 * to the pins of the board.
 */

pub mod arbiter;
pub mod lane;
pub mod presence;
pub mod sampler;
pub mod signal;
pub mod stopwatch;
pub mod timing;

pub use arbiter::{Arbiter, State, Tick, Transition};
pub use lane::{Aspect, Aspects, Lane};
pub use presence::{Detections, FaultChange, Presence};
pub use sampler::{DistanceSampler, Reading, Sample, SensorChannel};
pub use signal::SignalHead;
pub use stopwatch::{Clock, Stopwatch};
pub use timing::Timing;
