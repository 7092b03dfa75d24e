use std::collections::{BTreeMap, BTreeSet};

use super::{Location, Money, PlayerId};

/// Kind of structure a participant can build.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::AsRefStr,
    strum::FromRepr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum StructureKind {
    House = 0,
    Road = 1,
    Factory = 2,
}

impl StructureKind {
    pub const fn build_cost(self) -> Money {
        match self {
            Self::House => 100,
            Self::Road => 20,
            Self::Factory => 500,
        }
    }

    pub const fn demolish_cost(self) -> Money {
        match self {
            Self::House => 25,
            Self::Road => 5,
            Self::Factory => 120,
        }
    }

    /// Amount paid to the owner when the structure yields during a world step.
    pub const fn income(self) -> Money {
        match self {
            Self::House => 5,
            Self::Road => 0,
            Self::Factory => 40,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Structure {
    pub owner: PlayerId,
    pub kind: StructureKind,
}

/// Sparse tile map. Ordered collections keep iteration deterministic.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TileMap {
    width: u32,
    height: u32,
    water: BTreeSet<Location>,
    structures: BTreeMap<Location, Structure>,
}

impl TileMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            water: BTreeSet::new(),
            structures: BTreeMap::new(),
        }
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub fn contains(&self, location: Location) -> bool {
        u64::from(location.0) < u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_water(&self, location: Location) -> bool {
        self.water.contains(&location)
    }

    pub fn set_water(&mut self, location: Location) {
        self.water.insert(location);
    }

    pub fn structure(&self, location: Location) -> Option<&Structure> {
        self.structures.get(&location)
    }

    pub fn place(&mut self, location: Location, structure: Structure) {
        self.structures.insert(location, structure);
    }

    pub fn remove(&mut self, location: Location) -> Option<Structure> {
        self.structures.remove(&location)
    }

    pub fn structures(&self) -> impl Iterator<Item = (Location, &Structure)> {
        self.structures.iter().map(|(loc, s)| (*loc, s))
    }

    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }

    /// Tiles of the `width` x `height` rectangle anchored at `origin`,
    /// clipped to the map.
    pub fn rect(&self, origin: Location, width: u32, height: u32) -> Vec<Location> {
        let x0 = origin.x(self.width.max(1));
        let y0 = origin.y(self.width.max(1));
        let x1 = x0.saturating_add(width).min(self.width);
        let y1 = y0.saturating_add(height).min(self.height);
        (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .filter_map(|(x, y)| Location::from_xy(x, y, self.width))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_is_clipped_to_map() {
        let map = TileMap::new(4, 4);
        let corner = Location::from_xy(3, 3, 4).unwrap();
        assert_eq!(map.rect(corner, 3, 3), vec![corner]);
    }

    #[test]
    fn structure_kind_from_parameter() {
        assert_eq!(StructureKind::from_repr(0), Some(StructureKind::House));
        assert_eq!(StructureKind::from_repr(9), None);
        assert_eq!(StructureKind::Factory.to_string(), "factory");
    }
}
