//! Replicated world state.
//!
//! [`GameState`] is everything that must be identical across instances:
//! participants and their funds, the tile map, the pause flag, and the PRNG
//! whose seeds are compared at checkpoints. It is mutated only by command
//! handlers and by [`GameState::step`], never by the session layer.
mod random;
pub mod types;

pub use random::{Fingerprint, GameRandom};
pub use types::{Location, Money, PlayerId, PlayerState, Structure, StructureKind, TileMap};

use crate::config::GameConfig;

/// Odds (one in N per structure per frame) that a structure yields income.
const INCOME_ODDS: u32 = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GameState {
    pub players: [PlayerState; GameConfig::MAX_PLAYERS],
    pub map: TileMap,
    pub random: GameRandom,
    pub paused: bool,
    /// Number of unpaused world steps taken.
    pub tick: u64,
}

impl GameState {
    pub fn new(config: &GameConfig) -> Self {
        let mut players = [PlayerState::default(); GameConfig::MAX_PLAYERS];
        let active = usize::from(config.active_players).min(GameConfig::MAX_PLAYERS);
        for slot in players.iter_mut().take(active) {
            *slot = PlayerState::active(config.starting_funds);
        }

        Self {
            players,
            map: TileMap::new(config.map_width, config.map_height),
            random: GameRandom::new(config.seed),
            paused: false,
            tick: 0,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        id.index().map(|index| &self.players[index])
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerState> {
        id.index().map(|index| &mut self.players[index])
    }

    /// Funds available to `id`.
    ///
    /// The world has unlimited funds; spectators and out-of-range ids have none
    /// to speak of and yield `None`.
    pub fn available_funds(&self, id: PlayerId) -> Option<Money> {
        if id.is_world() {
            return Some(Money::MAX);
        }
        self.player(id).map(|player| player.money)
    }

    /// Debits `cost` from a participant. Negative costs credit income.
    /// Non-participants are never debited.
    pub fn subtract_money(&mut self, id: PlayerId, cost: Money) {
        if let Some(player) = self.player_mut(id) {
            player.money = player.money.saturating_sub(cost);
        }
    }

    /// Per-frame world update, run after the frame's commands are applied.
    ///
    /// Draws from the PRNG once per frame and once per income-yielding
    /// structure, so any divergence in applied commands shows up in the seeds.
    pub fn step(&mut self) {
        if self.paused {
            return;
        }
        self.tick += 1;
        self.random.next_u32();

        let mut payouts = Vec::new();
        for (_, structure) in self.map.structures() {
            let income = structure.kind.income();
            if income > 0 && self.random.range(INCOME_ODDS) == 0 {
                payouts.push((structure.owner, income));
            }
        }
        for (owner, income) in payouts {
            self.subtract_money(owner, -income);
        }
    }

    pub const fn fingerprint(&self) -> Fingerprint {
        self.random.fingerprint()
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(&GameConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_state() -> GameState {
        GameState::new(&GameConfig::default().with_starting_funds(1_000))
    }

    #[test]
    fn new_state_activates_configured_players() {
        let state = create_test_state();
        assert!(state.players[0].active);
        assert!(state.players[1].active);
        assert!(!state.players[2].active);
        assert_eq!(state.available_funds(PlayerId(0)), Some(1_000));
    }

    #[test]
    fn world_has_unlimited_funds_and_spectator_none() {
        let state = create_test_state();
        assert_eq!(state.available_funds(PlayerId::WORLD), Some(Money::MAX));
        assert_eq!(state.available_funds(PlayerId::SPECTATOR), None);
    }

    #[test]
    fn negative_cost_credits_income() {
        let mut state = create_test_state();
        state.subtract_money(PlayerId(0), -50);
        assert_eq!(state.players[0].money, 1_050);
        state.subtract_money(PlayerId::WORLD, 50);
        assert_eq!(state.players[0].money, 1_050);
    }

    #[test]
    fn step_advances_fingerprint_deterministically() {
        let mut a = create_test_state();
        let mut b = create_test_state();
        let before = a.fingerprint();
        for _ in 0..10 {
            a.step();
            b.step();
        }
        assert_ne!(a.fingerprint(), before);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.tick, 10);
    }

    #[test]
    fn paused_step_leaves_state_untouched() {
        let mut state = create_test_state();
        state.paused = true;
        let before = state.clone();
        state.step();
        assert_eq!(state, before);
    }

    #[test]
    fn factories_pay_their_owner_eventually() {
        let mut state = create_test_state();
        state.map.place(
            Location(10),
            Structure {
                owner: PlayerId(1),
                kind: StructureKind::Factory,
            },
        );
        for _ in 0..500 {
            state.step();
        }
        assert!(state.players[1].money > 1_000);
        assert_eq!(state.players[0].money, 1_000);
    }
}
