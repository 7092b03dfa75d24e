use crate::command::{
    CommandError, CommandHandler, CommandId, CommandRegistry, CommandResult, ExecFlags,
};
use crate::state::{GameState, Location, Money, PlayerId};

use super::ExecutionContext;

/// Runs commands against a world state with trial/commit semantics.
///
/// The executor borrows the world, the handler table and the execution
/// context for the duration of one top-level call. Handlers receive it back
/// so they can read state, issue nested commands and mutate on commit.
pub struct Executor<'a> {
    state: &'a mut GameState,
    registry: &'a CommandRegistry,
    ctx: &'a mut ExecutionContext,
}

impl<'a> Executor<'a> {
    pub fn new(
        state: &'a mut GameState,
        registry: &'a CommandRegistry,
        ctx: &'a mut ExecutionContext,
    ) -> Self {
        Self {
            state,
            registry,
            ctx,
        }
    }

    pub fn state(&self) -> &GameState {
        self.state
    }

    pub fn state_mut(&mut self) -> &mut GameState {
        self.state
    }

    pub fn registry(&self) -> &'a CommandRegistry {
        self.registry
    }

    pub fn context(&self) -> &ExecutionContext {
        self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        self.ctx
    }

    pub fn current_player(&self) -> PlayerId {
        self.ctx.current_player()
    }

    /// Funds of the acting party, `None` when it has no funds table entry.
    pub fn available_funds(&self) -> Option<Money> {
        self.state.available_funds(self.ctx.current_player())
    }

    /// Executes a command on behalf of the current player.
    ///
    /// The outermost call (depth one) always runs a trial first and checks
    /// affordability; nested commits reuse the outer trial unless
    /// [`ExecFlags::FORCE_TEST`] is set. Funds are debited only when the
    /// outermost commit returns.
    pub fn execute(
        &mut self,
        id: CommandId,
        location: Location,
        p1: u32,
        p2: u32,
        flags: ExecFlags,
    ) -> CommandResult {
        let handler = self.registry.lookup(id)?.handler;
        let player = self.ctx.current_player();
        if !player.is_valid() {
            return Err(CommandError::InvalidPlayer(player));
        }

        if self.ctx.depth() == 0 {
            self.ctx.begin_top_level(location);
        }

        self.ctx.enter();
        let result = self.run_phases(handler, location, p1, p2, flags);
        self.ctx.leave();

        let cost = result?;
        if flags.contains(ExecFlags::EXEC) && self.ctx.depth() == 0 {
            self.state.subtract_money(player, cost);
        }
        Ok(cost)
    }

    fn run_phases(
        &mut self,
        handler: CommandHandler,
        location: Location,
        p1: u32,
        p2: u32,
        flags: ExecFlags,
    ) -> CommandResult {
        let outermost = self.ctx.depth() == 1;

        if outermost || !flags.contains(ExecFlags::EXEC) || flags.contains(ExecFlags::FORCE_TEST) {
            let cost = self.call(handler, location, flags.trial(), p1, p2)?;
            if outermost && !flags.contains(ExecFlags::QUERY_COST) {
                self.check_funds(cost)?;
            }
            if !flags.contains(ExecFlags::EXEC) {
                return Ok(cost);
            }
        }

        self.call(handler, location, flags, p1, p2)
    }

    /// Invokes a handler once, recording its failure message.
    pub(crate) fn call(
        &mut self,
        handler: CommandHandler,
        location: Location,
        flags: ExecFlags,
        p1: u32,
        p2: u32,
    ) -> CommandResult {
        let result = handler(self, location, flags, p1, p2);
        if let Err(error) = &result {
            self.ctx.record_error(error.message());
        }
        result
    }

    /// Verifies the acting party can pay `cost`. Zero and negative costs
    /// always pass.
    pub fn check_funds(&mut self, cost: Money) -> Result<(), CommandError> {
        if cost <= 0 {
            return Ok(());
        }
        let player = self.ctx.current_player();
        match self.state.available_funds(player) {
            Some(available) if available >= cost => Ok(()),
            Some(available) => {
                self.ctx.record_shortfall(cost);
                let error = CommandError::InsufficientFunds {
                    required: cost,
                    available,
                };
                self.ctx.record_error(error.message());
                Err(error)
            }
            None => Err(CommandError::InvalidPlayer(player)),
        }
    }

    /// Debits the acting party. Used by dispatch when it settles a commit.
    pub(crate) fn settle(&mut self, cost: Money) {
        let player = self.ctx.current_player();
        self.state.subtract_money(player, cost);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::command::{CommandFlags, MessageId};
    use crate::config::GameConfig;
    use crate::error::{ErrorSeverity, GameError};
    use crate::state::{Structure, StructureKind};

    const CHARGE: CommandId = CommandId(0);
    const FAIL: CommandId = CommandId(1);
    const NESTED_PAIR: CommandId = CommandId(2);
    const NESTED_FAIL: CommandId = CommandId(3);

    thread_local! {
        static TRIALS: Cell<u32> = const { Cell::new(0) };
        static COMMITS: Cell<u32> = const { Cell::new(0) };
    }

    fn reset_counters() {
        TRIALS.with(|c| c.set(0));
        COMMITS.with(|c| c.set(0));
    }

    fn counts() -> (u32, u32) {
        (TRIALS.with(Cell::get), COMMITS.with(Cell::get))
    }

    fn charge(
        exec: &mut Executor<'_>,
        location: Location,
        flags: ExecFlags,
        p1: u32,
        _: u32,
    ) -> CommandResult {
        if flags.contains(ExecFlags::EXEC) {
            COMMITS.with(|c| c.set(c.get() + 1));
            let owner = exec.current_player();
            exec.state_mut().map.place(
                location,
                Structure {
                    owner,
                    kind: StructureKind::Road,
                },
            );
        } else {
            TRIALS.with(|c| c.set(c.get() + 1));
        }
        Ok(Money::from(p1))
    }

    fn fail(_: &mut Executor<'_>, _: Location, _: ExecFlags, _: u32, _: u32) -> CommandResult {
        Err(CommandError::rejected(MessageId::InvalidParameter))
    }

    fn nested_pair(
        exec: &mut Executor<'_>,
        location: Location,
        flags: ExecFlags,
        _: u32,
        _: u32,
    ) -> CommandResult {
        let first = exec.execute(CHARGE, Location(location.0 + 1), 30, 0, flags)?;
        let second = exec.execute(CHARGE, Location(location.0 + 2), 30, 0, flags)?;
        Ok(first + second + 40)
    }

    fn nested_fail(
        exec: &mut Executor<'_>,
        location: Location,
        flags: ExecFlags,
        _: u32,
        _: u32,
    ) -> CommandResult {
        exec.execute(CHARGE, location, 10, 0, flags)?;
        exec.execute(FAIL, location, 0, 0, flags)
    }

    fn test_registry() -> CommandRegistry {
        CommandRegistry::builder()
            .register("charge", CommandFlags::empty(), charge)
            .register("fail", CommandFlags::empty(), fail)
            .register("nested_pair", CommandFlags::empty(), nested_pair)
            .register("nested_fail", CommandFlags::empty(), nested_fail)
            .build()
    }

    fn create_test_state(funds: Money) -> GameState {
        GameState::new(&GameConfig::default().with_starting_funds(funds))
    }

    fn player_context(player: u8) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.set_current_player(PlayerId(player));
        ctx
    }

    #[test]
    fn trial_is_idempotent_and_pure() {
        let registry = test_registry();
        let mut state = create_test_state(1_000);
        let mut ctx = player_context(0);
        let before = state.clone();

        let mut exec = Executor::new(&mut state, &registry, &mut ctx);
        let first = exec.execute(CHARGE, Location(5), 100, 0, ExecFlags::empty());
        let second = exec.execute(CHARGE, Location(5), 100, 0, ExecFlags::empty());

        assert_eq!(first, Ok(100));
        assert_eq!(first, second);
        assert_eq!(state, before);
    }

    #[test]
    fn trial_and_commit_costs_match() {
        let registry = test_registry();
        let mut state = create_test_state(1_000);
        let mut ctx = player_context(0);

        let mut exec = Executor::new(&mut state, &registry, &mut ctx);
        let trial = exec.execute(NESTED_PAIR, Location(5), 0, 0, ExecFlags::empty());
        let commit = exec.execute(NESTED_PAIR, Location(5), 0, 0, ExecFlags::EXEC);

        assert_eq!(trial, Ok(100));
        assert_eq!(trial, commit);
    }

    #[test]
    fn nested_commit_debits_sum_once() {
        let registry = test_registry();
        let mut state = create_test_state(1_000);
        let mut ctx = player_context(0);

        let cost = Executor::new(&mut state, &registry, &mut ctx)
            .execute(NESTED_PAIR, Location(5), 0, 0, ExecFlags::EXEC)
            .expect("affordable");

        assert_eq!(cost, 100);
        assert_eq!(state.players[0].money, 900);
        assert_eq!(state.map.structure_count(), 2);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn nested_commits_skip_their_own_trial() {
        reset_counters();
        let registry = test_registry();
        let mut state = create_test_state(1_000);
        let mut ctx = player_context(0);

        Executor::new(&mut state, &registry, &mut ctx)
            .execute(NESTED_PAIR, Location(5), 0, 0, ExecFlags::EXEC)
            .expect("affordable");

        // Outer trial runs both nested trials; the outer commit runs both
        // nested commits directly.
        assert_eq!(counts(), (2, 2));
    }

    #[test]
    fn force_test_runs_nested_trials() {
        reset_counters();
        let registry = test_registry();
        let mut state = create_test_state(1_000);
        let mut ctx = player_context(0);

        Executor::new(&mut state, &registry, &mut ctx)
            .execute(
                NESTED_PAIR,
                Location(5),
                0,
                0,
                ExecFlags::EXEC | ExecFlags::FORCE_TEST,
            )
            .expect("affordable");

        assert_eq!(counts(), (4, 2));
    }

    #[test]
    fn depth_is_balanced_on_error_paths() {
        let registry = test_registry();
        let mut state = create_test_state(1_000);
        let mut ctx = player_context(0);
        let before = state.clone();

        let mut exec = Executor::new(&mut state, &registry, &mut ctx);
        let trial = exec.execute(NESTED_FAIL, Location(5), 0, 0, ExecFlags::EXEC);
        assert_eq!(exec.context().depth(), 0);
        assert_eq!(
            trial,
            Err(CommandError::rejected(MessageId::InvalidParameter))
        );
        assert_eq!(exec.context().last_error(), Some(MessageId::InvalidParameter));

        assert_eq!(state, before);
    }

    #[test]
    fn insufficient_funds_rejects_before_commit() {
        let registry = test_registry();
        let mut state = create_test_state(100);
        let mut ctx = player_context(0);

        let result = Executor::new(&mut state, &registry, &mut ctx).execute(
            CHARGE,
            Location(5),
            500,
            0,
            ExecFlags::EXEC,
        );

        assert_eq!(
            result,
            Err(CommandError::InsufficientFunds {
                required: 500,
                available: 100
            })
        );
        assert_eq!(ctx.additional_cash_required(), 500);
        assert_eq!(ctx.last_error(), Some(MessageId::NotEnoughCash));
        assert_eq!(state.players[0].money, 100);
        assert_eq!(state.map.structure_count(), 0);
    }

    #[test]
    fn query_cost_skips_affordability() {
        let registry = test_registry();
        let mut state = create_test_state(100);
        let mut ctx = player_context(0);

        let result = Executor::new(&mut state, &registry, &mut ctx).execute(
            CHARGE,
            Location(5),
            500,
            0,
            ExecFlags::QUERY_COST,
        );
        assert_eq!(result, Ok(500));
    }

    #[test]
    fn world_actions_are_never_debited() {
        let registry = test_registry();
        let mut state = create_test_state(100);
        let mut ctx = ExecutionContext::new();
        ctx.set_current_player(PlayerId::WORLD);
        let before = state.players;

        let result = Executor::new(&mut state, &registry, &mut ctx).execute(
            CHARGE,
            Location(5),
            5_000,
            0,
            ExecFlags::EXEC,
        );

        assert_eq!(result, Ok(5_000));
        assert_eq!(state.players, before);
    }

    #[test]
    fn unknown_command_and_bad_player_are_fatal() {
        let registry = test_registry();
        let mut state = create_test_state(100);
        let mut ctx = player_context(0);

        let err = Executor::new(&mut state, &registry, &mut ctx)
            .execute(CommandId(77), Location(1), 0, 0, ExecFlags::EXEC)
            .unwrap_err();
        assert_eq!(err.severity(), ErrorSeverity::Fatal);

        ctx.set_current_player(PlayerId(42));
        let err = Executor::new(&mut state, &registry, &mut ctx)
            .execute(CHARGE, Location(1), 0, 0, ExecFlags::EXEC)
            .unwrap_err();
        assert_eq!(err, CommandError::InvalidPlayer(PlayerId(42)));
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn top_level_call_records_last_build() {
        let registry = test_registry();
        let mut state = create_test_state(1_000);
        let mut ctx = player_context(1);

        Executor::new(&mut state, &registry, &mut ctx)
            .execute(CHARGE, Location(12), 1, 0, ExecFlags::EXEC)
            .expect("affordable");
        assert_eq!(ctx.last_build(PlayerId(1)), Some(Location(12)));
    }
}
