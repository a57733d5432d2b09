/*
 * A three-lamp signal head, driven through plain output pins.
 *
 * The lamps form a small bus: line 0 is green, line 1 is yellow and line 2 is
 * red, matching `Aspect::bits`. Some boards sink the lamp current rather than
 * source it, so a head can be marked active-low and the levels are inverted
 * on the way out. The control logic only ever talks in aspects and never has
 * to care about the wiring.
 */

use embedded_hal::digital::{OutputPin, PinState};

use crate::lane::Aspect;

pub const LINES_PER_HEAD: usize = 3;

pub struct SignalHead<P> {
    lines: [P; LINES_PER_HEAD],
    active_low: bool,
}

impl<P: OutputPin> SignalHead<P> {
    /// `lines` are ordered green, yellow, red.
    pub fn new(lines: [P; LINES_PER_HEAD], active_low: bool) -> Self {
        SignalHead { lines, active_low }
    }

    // Writes every line, including the ones that do not change.
    pub fn show(&mut self, aspect: Aspect) -> Result<(), P::Error> {
        let bits = aspect.bits();
        for (i, line) in self.lines.iter_mut().enumerate() {
            let on = bits & (1 << i) != 0;
            line.set_state(PinState::from(on != self.active_low))?;
        }
        Ok(())
    }

    pub fn release(self) -> [P; LINES_PER_HEAD] {
        self.lines
    }
}
