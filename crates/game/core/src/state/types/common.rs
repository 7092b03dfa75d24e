use std::fmt;

use crate::config::GameConfig;

/// Signed amount of money. Costs are positive, income is negative.
pub type Money = i64;

/// Identifier of the party a command acts on behalf of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlayerId(pub u8);

impl PlayerId {
    /// Non-participant used for world and administrative actions.
    ///
    /// Has unlimited funds and is never debited.
    pub const WORLD: Self = Self(0xFE);

    /// Observer without standing to act.
    pub const SPECTATOR: Self = Self(0xFF);

    /// Returns true for ids backed by a participant slot.
    #[inline]
    pub const fn is_participant(self) -> bool {
        (self.0 as usize) < GameConfig::MAX_PLAYERS
    }

    #[inline]
    pub const fn is_world(self) -> bool {
        self.0 == Self::WORLD.0
    }

    #[inline]
    pub const fn is_spectator(self) -> bool {
        self.0 == Self::SPECTATOR.0
    }

    /// Returns false for ids that are neither participants nor reserved.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.is_participant() || self.is_world() || self.is_spectator()
    }

    /// Slot index, if this id is a participant.
    #[inline]
    pub const fn index(self) -> Option<usize> {
        if self.is_participant() {
            Some(self.0 as usize)
        } else {
            None
        }
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::SPECTATOR
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::WORLD => write!(f, "world"),
            Self::SPECTATOR => write!(f, "spectator"),
            Self(id) => write!(f, "player#{}", id),
        }
    }
}

/// Row-major tile index. Index 0 doubles as "no location" for bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Location(pub u32);

impl Location {
    pub const NONE: Self = Self(0);

    /// `None` when the index does not fit in a `u32`.
    pub const fn from_xy(x: u32, y: u32, width: u32) -> Option<Self> {
        match y.checked_mul(width) {
            Some(row) => match row.checked_add(x) {
                Some(index) => Some(Self(index)),
                None => None,
            },
            None => None,
        }
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }

    pub const fn x(self, width: u32) -> u32 {
        self.0 % width
    }

    pub const fn y(self, width: u32) -> u32 {
        self.0 / width
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids_are_not_participants() {
        assert!(PlayerId(0).is_participant());
        assert!(PlayerId(7).is_participant());
        assert!(!PlayerId(8).is_participant());
        assert!(!PlayerId::WORLD.is_participant());
        assert!(PlayerId::WORLD.is_valid());
        assert!(PlayerId::SPECTATOR.is_valid());
        assert!(!PlayerId(42).is_valid());
    }

    #[test]
    fn location_coordinates_round_trip() {
        let loc = Location::from_xy(3, 5, 64).unwrap();
        assert_eq!(loc.x(64), 3);
        assert_eq!(loc.y(64), 5);
    }

    #[test]
    fn location_outside_index_range_is_none() {
        assert_eq!(Location::from_xy(0, u32::MAX, 2), None);
        assert_eq!(Location::from_xy(1, 1, u32::MAX), None);
        assert_eq!(
            Location::from_xy(u32::MAX - 1, 0, u32::MAX),
            Some(Location(u32::MAX - 1))
        );
    }
}
