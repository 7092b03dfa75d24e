//! Built-in command handlers and the standard handler table.
//!
//! Ids are positions in [`CommandRegistry::standard`] and are part of the
//! wire protocol: append new commands, never reorder.

use crate::engine::Executor;
use crate::state::{Location, Money, PlayerId, Structure, StructureKind};

use super::{
    CommandError, CommandFlags, CommandId, CommandRegistry, CommandResult, ExecFlags, MessageId,
};

pub const BUILD_STRUCTURE: CommandId = CommandId(0);
pub const DEMOLISH: CommandId = CommandId(1);
pub const CLEAR_AREA: CommandId = CommandId(2);
pub const GIVE_MONEY: CommandId = CommandId(3);
pub const PAUSE: CommandId = CommandId(4);

impl CommandRegistry {
    /// Handler table shared by every instance of this build.
    pub fn standard() -> Self {
        Self::builder()
            .register("build_structure", CommandFlags::empty(), build_structure)
            .register("demolish", CommandFlags::empty(), demolish)
            .register("clear_area", CommandFlags::NO_TEST, clear_area)
            .register("give_money", CommandFlags::empty(), give_money)
            .register(
                "pause",
                CommandFlags::SERVER | CommandFlags::PAUSE_EXEMPT,
                pause,
            )
            .build()
    }
}

/// Builds a structure of kind `p1` at `location`.
///
/// With [`ExecFlags::AUTO`] an existing structure of the same owner is
/// demolished first and its demolition cost added.
fn build_structure(
    exec: &mut Executor<'_>,
    location: Location,
    flags: ExecFlags,
    p1: u32,
    _p2: u32,
) -> CommandResult {
    let kind = StructureKind::from_repr(p1)
        .ok_or(CommandError::rejected(MessageId::InvalidParameter))?;
    let owner = exec.current_player();
    let map = &exec.state().map;

    if !map.contains(location) {
        return Err(CommandError::rejected(MessageId::OutOfBounds));
    }
    if flags.contains(ExecFlags::NO_WATER) && map.is_water(location) {
        return Err(CommandError::rejected(MessageId::WaterForbidden));
    }

    let mut cost = kind.build_cost();
    if let Some(existing) = map.structure(location).copied() {
        if !flags.contains(ExecFlags::AUTO) || existing.owner != owner {
            return Err(CommandError::rejected(MessageId::TileOccupied));
        }
        cost += exec.execute(DEMOLISH, location, 0, 0, flags & ExecFlags::EXEC)?;
    }

    if flags.contains(ExecFlags::EXEC) {
        exec.state_mut()
            .map
            .place(location, Structure { owner, kind });
    }
    Ok(cost)
}

fn demolish(
    exec: &mut Executor<'_>,
    location: Location,
    flags: ExecFlags,
    _p1: u32,
    _p2: u32,
) -> CommandResult {
    let actor = exec.current_player();
    let structure = exec
        .state()
        .map
        .structure(location)
        .copied()
        .ok_or(CommandError::rejected(MessageId::NothingToDemolish))?;

    if structure.owner != actor && !actor.is_world() {
        return Err(CommandError::rejected(MessageId::NotOwner));
    }

    if flags.contains(ExecFlags::EXEC) {
        exec.state_mut().map.remove(location);
    }
    Ok(structure.kind.demolish_cost())
}

/// Demolishes every owned structure in a `p1` x `p2` rectangle.
///
/// Tiles the actor may not clear are skipped. On commit the running total is
/// checked against available funds and clearing stops at the first tile the
/// actor can no longer pay for, so the trial total may exceed the commit total.
fn clear_area(
    exec: &mut Executor<'_>,
    location: Location,
    flags: ExecFlags,
    p1: u32,
    p2: u32,
) -> CommandResult {
    if p1 == 0 || p2 == 0 {
        return Err(CommandError::rejected(MessageId::InvalidParameter));
    }

    let tiles = exec.state().map.rect(location, p1, p2);
    let mut total: Money = 0;
    let mut found_any = false;
    let mut cleared_any = false;

    for tile in tiles {
        let Ok(cost) = exec.execute(DEMOLISH, tile, 0, 0, flags.trial()) else {
            continue;
        };
        found_any = true;

        if flags.contains(ExecFlags::EXEC) {
            if let Some(available) = exec.available_funds()
                && total + cost > available
            {
                exec.context_mut().record_shortfall(cost);
                break;
            }
            exec.execute(DEMOLISH, tile, 0, 0, flags)?;
            cleared_any = true;
        }
        total += cost;
    }

    if !found_any {
        return Err(CommandError::rejected(MessageId::NothingToDemolish));
    }
    if flags.contains(ExecFlags::EXEC) && !cleared_any {
        return Err(CommandError::rejected(MessageId::NotEnoughCash));
    }
    Ok(total)
}

/// Transfers `p1` to participant `p2`. The amount is the command's cost, so
/// settlement debits the sender.
fn give_money(
    exec: &mut Executor<'_>,
    _location: Location,
    flags: ExecFlags,
    p1: u32,
    p2: u32,
) -> CommandResult {
    let sender = exec.current_player();
    let recipient = u8::try_from(p2)
        .map(PlayerId)
        .map_err(|_| CommandError::rejected(MessageId::InvalidParameter))?;

    if p1 == 0 || recipient == sender || !sender.is_participant() {
        return Err(CommandError::rejected(MessageId::InvalidParameter));
    }
    let active = exec
        .state()
        .player(recipient)
        .is_some_and(|player| player.active);
    if !active {
        return Err(CommandError::rejected(MessageId::InactivePlayer));
    }

    let amount = Money::from(p1);
    if flags.contains(ExecFlags::EXEC) {
        exec.state_mut().subtract_money(recipient, -amount);
    }
    Ok(amount)
}

/// `p1 != 0` pauses the world step, `p1 == 0` resumes it.
fn pause(
    exec: &mut Executor<'_>,
    _location: Location,
    flags: ExecFlags,
    p1: u32,
    _p2: u32,
) -> CommandResult {
    if flags.contains(ExecFlags::EXEC) {
        exec.state_mut().paused = p1 != 0;
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::engine::ExecutionContext;
    use crate::state::GameState;

    fn create_test_state() -> GameState {
        GameState::new(&GameConfig::default().with_starting_funds(1_000))
    }

    fn run(
        state: &mut GameState,
        player: PlayerId,
        id: CommandId,
        location: Location,
        p1: u32,
        p2: u32,
        flags: ExecFlags,
    ) -> CommandResult {
        let registry = CommandRegistry::standard();
        let mut ctx = ExecutionContext::new();
        ctx.set_current_player(player);
        Executor::new(state, &registry, &mut ctx).execute(id, location, p1, p2, flags)
    }

    fn house(owner: u8) -> Structure {
        Structure {
            owner: PlayerId(owner),
            kind: StructureKind::House,
        }
    }

    #[test]
    fn build_places_structure_and_debits() {
        let mut state = create_test_state();
        let cost = run(
            &mut state,
            PlayerId(0),
            BUILD_STRUCTURE,
            Location(5),
            StructureKind::House as u32,
            0,
            ExecFlags::EXEC,
        );
        assert_eq!(cost, Ok(100));
        assert_eq!(state.map.structure(Location(5)), Some(&house(0)));
        assert_eq!(state.players[0].money, 900);
    }

    #[test]
    fn build_on_occupied_tile_needs_auto() {
        let mut state = create_test_state();
        state.map.place(Location(5), house(0));

        let plain = run(
            &mut state,
            PlayerId(0),
            BUILD_STRUCTURE,
            Location(5),
            StructureKind::Factory as u32,
            0,
            ExecFlags::EXEC,
        );
        assert_eq!(plain, Err(CommandError::rejected(MessageId::TileOccupied)));

        let auto = run(
            &mut state,
            PlayerId(0),
            BUILD_STRUCTURE,
            Location(5),
            StructureKind::Factory as u32,
            0,
            ExecFlags::EXEC | ExecFlags::AUTO,
        );
        assert_eq!(auto, Ok(500 + 25));
        assert_eq!(
            state.map.structure(Location(5)).map(|s| s.kind),
            Some(StructureKind::Factory)
        );
        assert_eq!(state.players[0].money, 1_000 - 525);
    }

    #[test]
    fn auto_never_clears_foreign_structures() {
        let mut state = create_test_state();
        state.map.place(Location(5), house(1));
        let result = run(
            &mut state,
            PlayerId(0),
            BUILD_STRUCTURE,
            Location(5),
            StructureKind::Road as u32,
            0,
            ExecFlags::EXEC | ExecFlags::AUTO,
        );
        assert_eq!(result, Err(CommandError::rejected(MessageId::TileOccupied)));
    }

    #[test]
    fn no_water_rejects_water_tiles() {
        let mut state = create_test_state();
        state.map.set_water(Location(7));
        let result = run(
            &mut state,
            PlayerId(0),
            BUILD_STRUCTURE,
            Location(7),
            StructureKind::Road as u32,
            0,
            ExecFlags::EXEC | ExecFlags::NO_WATER,
        );
        assert_eq!(result, Err(CommandError::rejected(MessageId::WaterForbidden)));
    }

    #[test]
    fn demolish_requires_ownership() {
        let mut state = create_test_state();
        state.map.place(Location(3), house(1));

        let foreign = run(
            &mut state,
            PlayerId(0),
            DEMOLISH,
            Location(3),
            0,
            0,
            ExecFlags::EXEC,
        );
        assert_eq!(foreign, Err(CommandError::rejected(MessageId::NotOwner)));

        let world = run(
            &mut state,
            PlayerId::WORLD,
            DEMOLISH,
            Location(3),
            0,
            0,
            ExecFlags::EXEC,
        );
        assert_eq!(world, Ok(25));
        assert!(state.map.structure(Location(3)).is_none());
    }

    #[test]
    fn clear_area_skips_foreign_tiles_and_debits_once() {
        let mut state = create_test_state();
        let width = state.map.width();
        state.map.place(Location::from_xy(0, 0, width).unwrap(), house(0));
        state.map.place(Location::from_xy(1, 0, width).unwrap(), house(1));
        state.map.place(Location::from_xy(0, 1, width).unwrap(), house(0));

        let result = run(
            &mut state,
            PlayerId(0),
            CLEAR_AREA,
            Location::from_xy(0, 0, width).unwrap(),
            2,
            2,
            ExecFlags::EXEC,
        );

        assert_eq!(result, Ok(50));
        assert_eq!(state.players[0].money, 950);
        assert_eq!(state.map.structure_count(), 1);
    }

    #[test]
    fn clear_area_stops_when_funds_run_out() {
        let mut state = GameState::new(&GameConfig::default().with_starting_funds(30));
        let width = state.map.width();
        state.map.place(Location::from_xy(0, 0, width).unwrap(), house(0));
        state.map.place(Location::from_xy(1, 0, width).unwrap(), house(0));

        let registry = CommandRegistry::standard();
        let mut ctx = ExecutionContext::new();
        ctx.set_current_player(PlayerId(0));
        let mut exec = Executor::new(&mut state, &registry, &mut ctx);

        // Nested inside another command so the outer affordability check
        // does not reject the 50 trial total up front.
        exec.context_mut().enter();
        let result = exec.execute(
            CLEAR_AREA,
            Location::from_xy(0, 0, width).unwrap(),
            2,
            1,
            ExecFlags::EXEC,
        );
        exec.context_mut().leave();

        assert_eq!(result, Ok(25));
        assert_eq!(state.map.structure_count(), 1);
    }

    #[test]
    fn clear_area_that_clears_nothing_fails() {
        let mut state = GameState::new(&GameConfig::default().with_starting_funds(10));
        state.map.place(Location(0), house(0));

        let registry = CommandRegistry::standard();
        let mut ctx = ExecutionContext::new();
        ctx.set_current_player(PlayerId(0));
        let mut exec = Executor::new(&mut state, &registry, &mut ctx);

        exec.context_mut().enter();
        let result = exec.execute(CLEAR_AREA, Location(0), 1, 1, ExecFlags::EXEC);
        exec.context_mut().leave();
        assert_eq!(exec.context().additional_cash_required(), 25);

        assert_eq!(result, Err(CommandError::rejected(MessageId::NotEnoughCash)));
        assert!(state.map.structure(Location(0)).is_some());
        assert_eq!(state.players[0].money, 10);
    }

    #[test]
    fn give_money_moves_funds() {
        let mut state = create_test_state();
        let result = run(
            &mut state,
            PlayerId(0),
            GIVE_MONEY,
            Location::NONE,
            300,
            1,
            ExecFlags::EXEC,
        );
        assert_eq!(result, Ok(300));
        assert_eq!(state.players[0].money, 700);
        assert_eq!(state.players[1].money, 1_300);
    }

    #[test]
    fn give_money_to_inactive_slot_fails() {
        let mut state = create_test_state();
        let result = run(
            &mut state,
            PlayerId(0),
            GIVE_MONEY,
            Location::NONE,
            10,
            5,
            ExecFlags::EXEC,
        );
        assert_eq!(result, Err(CommandError::rejected(MessageId::InactivePlayer)));
    }

    #[test]
    fn pause_toggles_flag_only_on_commit() {
        let mut state = create_test_state();
        run(&mut state, PlayerId(0), PAUSE, Location::NONE, 1, 0, ExecFlags::empty())
            .expect("trial");
        assert!(!state.paused);
        run(&mut state, PlayerId(0), PAUSE, Location::NONE, 1, 0, ExecFlags::EXEC)
            .expect("commit");
        assert!(state.paused);
    }
}
