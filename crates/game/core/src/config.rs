/// World configuration constants and tunable parameters.
///
/// Every instance in a session must be built from the same configuration,
/// otherwise the first checkpoint reports a desynchronization.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GameConfig {
    /// Map width in tiles.
    pub map_width: u32,
    /// Map height in tiles.
    pub map_height: u32,
    /// Funds every active participant starts with.
    pub starting_funds: i64,
    /// Number of participant slots marked active at start.
    pub active_players: u8,
    /// Initial PRNG seeds.
    pub seed: [u32; 2],
}

impl GameConfig {
    // ===== compile-time constants =====
    /// Number of participant slots. Ids `0..MAX_PLAYERS` are participants.
    pub const MAX_PLAYERS: usize = 8;
    /// Longest text payload a command may carry, in bytes.
    pub const MAX_TEXT_LEN: usize = 80;

    // ===== runtime-tunable defaults =====
    pub const DEFAULT_MAP_WIDTH: u32 = 64;
    pub const DEFAULT_MAP_HEIGHT: u32 = 64;
    pub const DEFAULT_STARTING_FUNDS: i64 = 10_000;
    pub const DEFAULT_ACTIVE_PLAYERS: u8 = 2;
    pub const DEFAULT_SEED: [u32; 2] = [0x1234_5678, 0x9ABC_DEF0];

    pub fn new() -> Self {
        Self {
            map_width: Self::DEFAULT_MAP_WIDTH,
            map_height: Self::DEFAULT_MAP_HEIGHT,
            starting_funds: Self::DEFAULT_STARTING_FUNDS,
            active_players: Self::DEFAULT_ACTIVE_PLAYERS,
            seed: Self::DEFAULT_SEED,
        }
    }

    pub fn with_seed(mut self, seed: [u32; 2]) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_starting_funds(mut self, funds: i64) -> Self {
        self.starting_funds = funds;
        self
    }

    pub fn with_map_size(mut self, width: u32, height: u32) -> Self {
        self.map_width = width;
        self.map_height = height;
        self
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::new()
    }
}
