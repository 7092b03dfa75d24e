pub mod common;
pub mod player;
pub mod world;

pub use common::{Location, Money, PlayerId};
pub use player::PlayerState;
pub use world::{Structure, StructureKind, TileMap};
