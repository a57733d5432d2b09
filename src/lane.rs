/*
 * The two approaches to the intersection and the colours their signal heads
 * can show.
 */

use core::fmt;
use enum_ordinalize::Ordinalize;

#[derive(Ordinalize, Debug, PartialEq, Eq, Copy, Clone)]
#[repr(usize)]
pub enum Lane {
    Red,
    Blue,
}

impl Lane {
    pub fn name(self) -> &'static str {
        match self {
            Lane::Red => "Red",
            Lane::Blue => "Blue",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// A signal head shows exactly one colour at a time.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Aspect {
    Red,
    Yellow,
    Green,
}

impl Aspect {
    // Bus value with the lines ordered green, yellow, red from bit 0 upward.
    pub const fn bits(self) -> u8 {
        match self {
            Aspect::Red => 0b100,
            Aspect::Yellow => 0b010,
            Aspect::Green => 0b001,
        }
    }

    pub fn red(self) -> bool {
        self == Aspect::Red
    }

    pub fn yellow(self) -> bool {
        self == Aspect::Yellow
    }

    pub fn green(self) -> bool {
        self == Aspect::Green
    }
}

/// The aspects of both lanes, indexed by [`Lane::ordinal`].
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Aspects([Aspect; Lane::VARIANT_COUNT]);

impl Aspects {
    pub const fn new(red: Aspect, blue: Aspect) -> Self {
        Aspects([red, blue])
    }

    pub fn lane(&self, lane: Lane) -> Aspect {
        self.0[lane.ordinal()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_aspect_sets_exactly_one_bit() {
        for aspect in [Aspect::Red, Aspect::Yellow, Aspect::Green] {
            assert_eq!(aspect.bits().count_ones(), 1, "{aspect:?}");
            let lit = [aspect.red(), aspect.yellow(), aspect.green()];
            assert_eq!(lit.iter().filter(|on| **on).count(), 1);
        }
    }

    #[test]
    fn bus_bit_order() {
        assert_eq!(Aspect::Red.bits(), 0b100);
        assert_eq!(Aspect::Yellow.bits(), 0b010);
        assert_eq!(Aspect::Green.bits(), 0b001);
    }

    #[test]
    fn aspects_are_indexed_by_lane() {
        let aspects = Aspects::new(Aspect::Yellow, Aspect::Red);
        assert_eq!(aspects.lane(Lane::Red), Aspect::Yellow);
        assert_eq!(aspects.lane(Lane::Blue), Aspect::Red);
    }
}
