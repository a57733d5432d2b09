/*
 * The arbitration state machine.
 *
 * One lane holds green for as long as nobody is waiting on the other one.
 * Once both approaches report a vehicle the lane with green gets a capped
 * amount of extra time. After that the signal always runs through a fixed
 * yellow and all-red clearance before the other lane gets green.
 *
 * What a state shows on the lamps and when the machine leaves a state are
 * kept apart: `State::aspects` is a plain lookup, the exits live in the edge
 * table built by `edges`.
 */

use core::fmt;
use embassy_time::{Duration, Instant};
use enum_ordinalize::Ordinalize;

use crate::lane::{Aspect, Aspects, Lane};
use crate::presence::Presence;
use crate::stopwatch::Stopwatch;
use crate::timing::Timing;

#[derive(Ordinalize, Debug, PartialEq, Eq, Copy, Clone)]
#[repr(usize)]
pub enum State {
    Init,
    RedGo,
    RedContested,
    RedSlow,
    RedEnd,
    BlueGo,
    BlueContested,
    BlueSlow,
    BlueEnd,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            State::Init => "Init",
            State::RedGo => "RedGo",
            State::RedContested => "RedContested",
            State::RedSlow => "RedSlow",
            State::RedEnd => "RedEnd",
            State::BlueGo => "BlueGo",
            State::BlueContested => "BlueContested",
            State::BlueSlow => "BlueSlow",
            State::BlueEnd => "BlueEnd",
        }
    }

    /// What the lamps show in this state. `Init` leaves them alone.
    pub fn aspects(self) -> Option<Aspects> {
        match self {
            State::Init => None,
            State::RedGo | State::RedContested => Some(Aspects::new(Aspect::Green, Aspect::Red)),
            State::RedSlow => Some(Aspects::new(Aspect::Yellow, Aspect::Red)),
            State::RedEnd | State::BlueEnd => Some(Aspects::new(Aspect::Red, Aspect::Red)),
            State::BlueGo | State::BlueContested => Some(Aspects::new(Aspect::Red, Aspect::Green)),
            State::BlueSlow => Some(Aspects::new(Aspect::Red, Aspect::Yellow)),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Guard {
    Always,
    // Both lanes have traffic.
    Contested,
    // Traffic is waiting on blue and there is none on red.
    OnlyBlue,
    Clear(Lane),
    // Either the contest cap has run out or the lane has emptied.
    CapOrClear(Lane, Duration),
    After(Duration),
}

impl Guard {
    pub fn holds(&self, presence: Presence, elapsed: Duration) -> bool {
        match *self {
            Guard::Always => true,
            Guard::Contested => presence.red && presence.blue,
            Guard::OnlyBlue => presence.blue && !presence.red,
            Guard::Clear(lane) => !presence.lane(lane),
            Guard::CapOrClear(lane, cap) => elapsed >= cap || !presence.lane(lane),
            Guard::After(interval) => elapsed >= interval,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Edge {
    pub from: State,
    pub guard: Guard,
    pub to: State,
}

impl Edge {
    const fn new(from: State, guard: Guard, to: State) -> Self {
        Edge { from, guard, to }
    }
}

pub const EDGE_COUNT: usize = 11;

/*
 * The transition table. Edges leaving the same state are tried in the order
 * listed and the first one that holds is taken.
 *
 * Red only gives up green when blue traffic shows up, whether or not there is
 * any red traffic left. There is no maximum green for an idle lane.
 */
pub const fn edges(timing: &Timing) -> [Edge; EDGE_COUNT] {
    use State::*;
    [
        Edge::new(Init, Guard::Always, RedGo),
        Edge::new(RedGo, Guard::Contested, RedContested),
        Edge::new(RedGo, Guard::OnlyBlue, RedSlow),
        Edge::new(RedContested, Guard::CapOrClear(Lane::Red, timing.red_contest_cap), RedSlow),
        Edge::new(RedSlow, Guard::After(timing.yellow), RedEnd),
        Edge::new(RedEnd, Guard::After(timing.all_red), BlueGo),
        Edge::new(BlueGo, Guard::Clear(Lane::Blue), BlueSlow),
        Edge::new(BlueGo, Guard::Contested, BlueContested),
        Edge::new(BlueContested, Guard::CapOrClear(Lane::Blue, timing.blue_contest_cap), BlueSlow),
        Edge::new(BlueSlow, Guard::After(timing.yellow), BlueEnd),
        Edge::new(BlueEnd, Guard::After(timing.all_red), RedGo),
    ]
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Transition {
    pub from: State,
    pub to: State,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// The result of one tick: what to put on the lamps, and the state change
/// if there was one.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Tick {
    pub aspects: Option<Aspects>,
    pub transition: Option<Transition>,
}

#[derive(Debug)]
pub struct Arbiter {
    state: State,
    timer: Stopwatch,
    edges: [Edge; EDGE_COUNT],
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new(&Timing::DEFAULT)
    }
}

impl Arbiter {
    pub fn new(timing: &Timing) -> Self {
        Arbiter {
            state: State::Init,
            timer: Stopwatch::new(),
            edges: edges(timing),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Time spent in the current state. Zero before the first tick.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.timer.elapsed(now)
    }

    /*
     * Determine the next state, without changing the state that we are in.
     */
    fn next_state(&self, presence: Presence, elapsed: Duration) -> Option<State> {
        self.edges
            .iter()
            .filter(|edge| edge.from == self.state)
            .find(|edge| edge.guard.holds(presence, elapsed))
            .map(|edge| edge.to)
    }

    /*
     * The lamps reflect the state the tick started in. A transition taken
     * here shows up on the lamps from the next tick on.
     */
    pub fn tick(&mut self, now: Instant, presence: Presence) -> Tick {
        let aspects = self.state.aspects();
        let elapsed = self.timer.elapsed(now);

        let transition = self.next_state(presence, elapsed).map(|to| {
            let transition = Transition {
                from: self.state,
                to,
            };
            self.state = to;
            self.timer.restart(now);
            transition
        });

        Tick {
            aspects,
            transition,
        }
    }
}
