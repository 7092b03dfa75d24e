//! Single entry point for gameplay-affecting commands.
//!
//! [`Dispatcher::dispatch`] admits a command, runs its trial, and then either
//! commits it locally or hands it to a [`CommandSink`] for replication.
//! Commands coming back from the replication queue are replayed through
//! [`Dispatcher::apply`] at their agreed frame.

use crate::command::{
    Command, CommandCallback, CommandEntry, CommandError, CommandFlags, CommandHandler,
    CommandRegistry, CommandReport, CommandResult, DispatchOptions, ExecFlags, MessageId,
};
use crate::state::{GameState, Location, Money};

use super::{ExecutionContext, Executor};

/// Where this instance sits in a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionRole {
    /// Single instance, no replication.
    Offline,
    /// Owns the frame clock and the command order.
    Authority,
    /// Replicates the authority's command stream.
    Follower,
}

/// Receives commands that passed admission and trial and must be replicated.
///
/// The sink takes ownership of the completion callback; it is responsible
/// for invoking it once the command is applied or the session ends.
pub trait CommandSink {
    fn submit(&mut self, command: Command, callback: Option<CommandCallback>);
}

/// Stage of dispatch that refused a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionPhase {
    /// Standing, pause and role checks.
    Admission,
    Trial,
    Commit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Committed locally. `trial` is the trial cost when a trial ran.
    Applied { cost: Money, trial: Option<Money> },
    /// Handed to the replication queue.
    Queued,
    /// Cost preview only; nothing was committed or queued.
    Estimated(CommandResult),
    Rejected {
        phase: ExecutionPhase,
        error: CommandError,
    },
}

impl DispatchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::Queued)
    }

    pub fn error(&self) -> Option<&CommandError> {
        match self {
            Self::Rejected { error, .. } => Some(error),
            Self::Estimated(Err(error)) => Some(error),
            _ => None,
        }
    }

    /// Trial and commit costs when they disagree.
    pub fn parity_mismatch(&self) -> Option<(Money, Money)> {
        match *self {
            Self::Applied {
                cost,
                trial: Some(trial),
            } if trial != cost => Some((trial, cost)),
            _ => None,
        }
    }

    fn rejected(phase: ExecutionPhase, error: CommandError) -> Self {
        Self::Rejected { phase, error }
    }
}

pub struct Dispatcher<'a> {
    executor: Executor<'a>,
    role: SessionRole,
    sink: Option<&'a mut dyn CommandSink>,
}

impl<'a> Dispatcher<'a> {
    /// Dispatcher for a single instance: every accepted command commits locally.
    pub fn offline(
        state: &'a mut GameState,
        registry: &'a CommandRegistry,
        ctx: &'a mut ExecutionContext,
    ) -> Self {
        Self {
            executor: Executor::new(state, registry, ctx),
            role: SessionRole::Offline,
            sink: None,
        }
    }

    /// Dispatcher for a session member: accepted commands go to `sink`.
    pub fn networked(
        state: &'a mut GameState,
        registry: &'a CommandRegistry,
        ctx: &'a mut ExecutionContext,
        role: SessionRole,
        sink: &'a mut dyn CommandSink,
    ) -> Self {
        Self {
            executor: Executor::new(state, registry, ctx),
            role,
            sink: Some(sink),
        }
    }

    fn networked_session(&self) -> bool {
        self.sink.is_some()
    }

    /// Admits, validates and then commits or queues `command`.
    ///
    /// A supplied callback is invoked exactly once: right away unless the
    /// command was queued, in which case the sink owns it.
    pub fn dispatch(
        &mut self,
        command: Command,
        mut callback: Option<CommandCallback>,
    ) -> DispatchOutcome {
        let report = command.report(false);
        let outcome = self.dispatch_inner(command, &mut callback);
        if let Some(callback) = callback {
            callback(CommandReport {
                success: outcome.is_accepted(),
                ..report
            });
        }
        outcome
    }

    /// Replays a command taken from the replication queue.
    ///
    /// Admission already happened where the command was submitted, so only
    /// the trial (unless exempt) and the commit run here.
    pub fn apply(
        &mut self,
        command: &Command,
        callback: Option<CommandCallback>,
    ) -> DispatchOutcome {
        let outcome = match self.executor.registry().lookup(command.id) {
            Ok(entry) => {
                let entry = *entry;
                let notest = Self::skips_trial(&entry, command.options, true);
                self.begin(command);
                let outcome = self.trial_and_commit(command, &entry, notest);
                self.executor.context_mut().leave();
                outcome
            }
            Err(error) => DispatchOutcome::rejected(ExecutionPhase::Admission, error),
        };
        if let Some(callback) = callback {
            callback(command.report(outcome.is_accepted()));
        }
        outcome
    }

    fn dispatch_inner(
        &mut self,
        command: Command,
        callback: &mut Option<CommandCallback>,
    ) -> DispatchOutcome {
        let entry = match self.executor.registry().lookup(command.id) {
            Ok(entry) => *entry,
            Err(error) => return DispatchOutcome::rejected(ExecutionPhase::Admission, error),
        };
        if let Err(error) = self.admit(&command, &entry) {
            return DispatchOutcome::rejected(ExecutionPhase::Admission, error);
        }

        let notest = Self::skips_trial(&entry, command.options, self.networked_session());
        self.begin(&command);
        let outcome = self.run(command, &entry, notest, callback);
        self.executor.context_mut().leave();
        outcome
    }

    fn admit(&self, command: &Command, entry: &CommandEntry) -> Result<(), CommandError> {
        let player = command.player;
        if !player.is_valid() {
            return Err(CommandError::InvalidPlayer(player));
        }
        if player.is_spectator() && !entry.flags.contains(CommandFlags::SPECTATOR) {
            return Err(CommandError::NoStanding {
                player,
                command: command.id,
            });
        }
        if self.networked_session()
            && self.executor.state().paused
            && !entry.flags.contains(CommandFlags::PAUSE_EXEMPT)
        {
            return Err(CommandError::Paused);
        }
        match self.role {
            SessionRole::Offline => Ok(()),
            _ if entry.flags.contains(CommandFlags::OFFLINE) => {
                Err(CommandError::OfflineOnly(command.id))
            }
            SessionRole::Follower if entry.flags.contains(CommandFlags::SERVER) => {
                Err(CommandError::ServerOnly(command.id))
            }
            _ => Ok(()),
        }
    }

    fn skips_trial(entry: &CommandEntry, options: DispatchOptions, networked: bool) -> bool {
        entry.flags.contains(CommandFlags::NO_TEST)
            || options.contains(DispatchOptions::NO_TEST)
            || (networked && options.contains(DispatchOptions::ASYNC))
    }

    /// Enters the outermost execution level for `command`.
    fn begin(&mut self, command: &Command) {
        let ctx = self.executor.context_mut();
        debug_assert_eq!(ctx.depth(), 0, "dispatch while a command is executing");
        ctx.set_current_player(command.player);
        ctx.set_text(command.text);
        ctx.begin_top_level(Location::NONE);
        ctx.enter();
    }

    fn run(
        &mut self,
        command: Command,
        entry: &CommandEntry,
        notest: bool,
        callback: &mut Option<CommandCallback>,
    ) -> DispatchOutcome {
        let flags = ExecFlags::resolve(entry.flags, command.options);
        let options = command.options;

        if options.contains(DispatchOptions::ESTIMATE_ONLY)
            && !options.contains(DispatchOptions::DONT_NETWORK)
        {
            let result = self.executor.call(
                entry.handler,
                command.location,
                flags.trial() | ExecFlags::QUERY_COST,
                command.p1,
                command.p2,
            );
            return DispatchOutcome::Estimated(result);
        }

        let trial = if notest {
            None
        } else {
            match self.trial(&command, entry.handler, flags) {
                Ok(cost) => Some(cost),
                Err(error) => return DispatchOutcome::rejected(ExecutionPhase::Trial, error),
            }
        };

        if !options.contains(DispatchOptions::DONT_NETWORK)
            && let Some(sink) = self.sink.as_deref_mut()
        {
            sink.submit(command, callback.take());
            return DispatchOutcome::Queued;
        }

        self.commit(&command, entry.handler, flags, trial)
    }

    fn trial_and_commit(
        &mut self,
        command: &Command,
        entry: &CommandEntry,
        notest: bool,
    ) -> DispatchOutcome {
        let flags = ExecFlags::resolve(entry.flags, command.options);
        let trial = if notest {
            None
        } else {
            match self.trial(command, entry.handler, flags) {
                Ok(cost) => Some(cost),
                Err(error) => return DispatchOutcome::rejected(ExecutionPhase::Trial, error),
            }
        };
        self.commit(command, entry.handler, flags, trial)
    }

    /// Trial pass followed by the affordability check.
    fn trial(
        &mut self,
        command: &Command,
        handler: CommandHandler,
        flags: ExecFlags,
    ) -> CommandResult {
        let cost = self.executor.call(
            handler,
            command.location,
            flags.trial(),
            command.p1,
            command.p2,
        )?;
        self.executor.check_funds(cost)?;
        Ok(cost)
    }

    fn commit(
        &mut self,
        command: &Command,
        handler: CommandHandler,
        flags: ExecFlags,
        trial: Option<Money>,
    ) -> DispatchOutcome {
        self.executor
            .context_mut()
            .record_last_build(command.location);

        match self.executor.call(
            handler,
            command.location,
            flags.commit(),
            command.p1,
            command.p2,
        ) {
            Ok(0) if self.executor.context().additional_cash_required() > 0 => {
                // Stopped before doing anything for lack of funds.
                let error = CommandError::rejected(MessageId::NotEnoughCash);
                self.executor.context_mut().record_error(error.message());
                DispatchOutcome::rejected(ExecutionPhase::Commit, error)
            }
            Ok(cost) => {
                self.executor.settle(cost);
                DispatchOutcome::Applied { cost, trial }
            }
            Err(error) => DispatchOutcome::rejected(ExecutionPhase::Commit, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::command::builtin::{BUILD_STRUCTURE, CLEAR_AREA, PAUSE};
    use crate::command::CommandId;
    use crate::config::GameConfig;
    use crate::state::{Location, PlayerId, Structure, StructureKind};

    #[derive(Default)]
    struct RecordingSink {
        submitted: Vec<(Command, Option<CommandCallback>)>,
    }

    impl CommandSink for RecordingSink {
        fn submit(&mut self, command: Command, callback: Option<CommandCallback>) {
            self.submitted.push((command, callback));
        }
    }

    type Reports = Arc<Mutex<Vec<CommandReport>>>;

    fn recording_callback() -> (Reports, CommandCallback) {
        let reports: Reports = Arc::default();
        let sink = Arc::clone(&reports);
        let callback: CommandCallback = Box::new(move |report| {
            sink.lock().expect("reports lock").push(report);
        });
        (reports, callback)
    }

    fn create_test_state(funds: Money) -> GameState {
        GameState::new(&GameConfig::default().with_starting_funds(funds))
    }

    fn build_house(player: u8, location: u32) -> Command {
        Command::new(
            BUILD_STRUCTURE,
            PlayerId(player),
            Location(location),
            StructureKind::House as u32,
            0,
        )
    }

    #[test]
    fn offline_dispatch_commits_and_reports_success() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        let mut ctx = ExecutionContext::new();
        let (reports, callback) = recording_callback();

        let outcome = Dispatcher::offline(&mut state, &registry, &mut ctx)
            .dispatch(build_house(0, 5), Some(callback));

        assert_eq!(
            outcome,
            DispatchOutcome::Applied {
                cost: 100,
                trial: Some(100)
            }
        );
        assert_eq!(state.players[0].money, 900);
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.last_build(PlayerId(0)), Some(Location(5)));

        let reports = reports.lock().expect("reports lock");
        assert_eq!(reports.len(), 1);
        assert!(reports[0].success);
        assert_eq!(reports[0].location, Location(5));
    }

    #[test]
    fn unaffordable_command_is_rejected_and_never_queued() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(100);
        let before = state.clone();
        let mut ctx = ExecutionContext::new();
        let mut sink = RecordingSink::default();
        let (reports, callback) = recording_callback();

        let command = Command::new(
            BUILD_STRUCTURE,
            PlayerId(0),
            Location(5),
            StructureKind::Factory as u32,
            0,
        );
        let outcome = Dispatcher::networked(
            &mut state,
            &registry,
            &mut ctx,
            SessionRole::Authority,
            &mut sink,
        )
        .dispatch(command, Some(callback));

        assert!(!outcome.is_accepted());
        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                phase: ExecutionPhase::Trial,
                error: CommandError::InsufficientFunds {
                    required: 500,
                    available: 100
                }
            }
        );
        assert!(sink.submitted.is_empty());
        assert_eq!(state, before);
        let reports = reports.lock().expect("reports lock");
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].success);
    }

    #[test]
    fn networked_dispatch_queues_without_mutating() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        let before = state.clone();
        let mut ctx = ExecutionContext::new();
        let mut sink = RecordingSink::default();
        let (reports, callback) = recording_callback();

        let outcome = Dispatcher::networked(
            &mut state,
            &registry,
            &mut ctx,
            SessionRole::Follower,
            &mut sink,
        )
        .dispatch(build_house(1, 5), Some(callback));

        assert_eq!(outcome, DispatchOutcome::Queued);
        assert_eq!(state, before);
        assert_eq!(sink.submitted.len(), 1);
        assert!(reports.lock().expect("reports lock").is_empty());

        let (_, callback) = sink.submitted.pop().expect("queued");
        callback.expect("callback travels with the command")(build_house(1, 5).report(true));
        assert_eq!(reports.lock().expect("reports lock").len(), 1);
    }

    #[test]
    fn dont_network_commits_locally_in_session() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        let mut ctx = ExecutionContext::new();
        let mut sink = RecordingSink::default();

        let command = build_house(0, 5).with_options(DispatchOptions::DONT_NETWORK);
        let outcome = Dispatcher::networked(
            &mut state,
            &registry,
            &mut ctx,
            SessionRole::Authority,
            &mut sink,
        )
        .dispatch(command, None);

        assert!(matches!(outcome, DispatchOutcome::Applied { cost: 100, .. }));
        assert!(sink.submitted.is_empty());
    }

    #[test]
    fn spectators_have_no_standing() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        let mut ctx = ExecutionContext::new();
        let (reports, callback) = recording_callback();

        let command = Command::new(BUILD_STRUCTURE, PlayerId::SPECTATOR, Location(5), 0, 0);
        let outcome =
            Dispatcher::offline(&mut state, &registry, &mut ctx).dispatch(command, Some(callback));

        assert!(matches!(
            outcome,
            DispatchOutcome::Rejected {
                phase: ExecutionPhase::Admission,
                error: CommandError::NoStanding { .. }
            }
        ));
        assert_eq!(reports.lock().expect("reports lock").len(), 1);
    }

    #[test]
    fn paused_session_only_admits_exempt_commands() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        state.paused = true;
        let mut ctx = ExecutionContext::new();
        let mut sink = RecordingSink::default();

        let mut dispatcher = Dispatcher::networked(
            &mut state,
            &registry,
            &mut ctx,
            SessionRole::Authority,
            &mut sink,
        );
        let blocked = dispatcher.dispatch(build_house(0, 5), None);
        assert_eq!(blocked.error(), Some(&CommandError::Paused));

        let resume = Command::new(PAUSE, PlayerId(0), Location::NONE, 0, 0);
        assert_eq!(dispatcher.dispatch(resume, None), DispatchOutcome::Queued);
    }

    #[test]
    fn offline_dispatch_ignores_pause() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        state.paused = true;
        let mut ctx = ExecutionContext::new();

        let outcome =
            Dispatcher::offline(&mut state, &registry, &mut ctx).dispatch(build_house(0, 5), None);
        assert!(outcome.is_accepted());
    }

    #[test]
    fn followers_cannot_issue_server_commands() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        let mut ctx = ExecutionContext::new();
        let mut sink = RecordingSink::default();

        let outcome = Dispatcher::networked(
            &mut state,
            &registry,
            &mut ctx,
            SessionRole::Follower,
            &mut sink,
        )
        .dispatch(Command::new(PAUSE, PlayerId(1), Location::NONE, 1, 0), None);

        assert_eq!(outcome.error(), Some(&CommandError::ServerOnly(PAUSE)));
    }

    #[test]
    fn estimate_reports_cost_without_committing() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(10);
        let before = state.clone();
        let mut ctx = ExecutionContext::new();
        let (reports, callback) = recording_callback();

        let command = build_house(0, 5).with_options(DispatchOptions::ESTIMATE_ONLY);
        let outcome =
            Dispatcher::offline(&mut state, &registry, &mut ctx).dispatch(command, Some(callback));

        assert_eq!(outcome, DispatchOutcome::Estimated(Ok(100)));
        assert!(!outcome.is_accepted());
        assert_eq!(state, before);
        assert!(!reports.lock().expect("reports lock")[0].success);
    }

    #[test]
    fn no_test_commands_skip_trial_and_fail_at_commit() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        let mut ctx = ExecutionContext::new();

        let command = Command::new(CLEAR_AREA, PlayerId(0), Location(0), 2, 2);
        let outcome = Dispatcher::offline(&mut state, &registry, &mut ctx).dispatch(command, None);

        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                phase: ExecutionPhase::Commit,
                error: CommandError::rejected(MessageId::NothingToDemolish)
            }
        );
        assert_eq!(ctx.last_error(), Some(MessageId::NothingToDemolish));
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn clear_that_cannot_pay_for_anything_fails() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(10);
        state.map.place(
            Location(0),
            Structure {
                owner: PlayerId(0),
                kind: StructureKind::House,
            },
        );
        let mut ctx = ExecutionContext::new();
        let (reports, callback) = recording_callback();

        let command = Command::new(CLEAR_AREA, PlayerId(0), Location(0), 1, 1);
        let outcome = Dispatcher::offline(&mut state, &registry, &mut ctx)
            .dispatch(command, Some(callback));

        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                phase: ExecutionPhase::Commit,
                error: CommandError::rejected(MessageId::NotEnoughCash)
            }
        );
        assert!(state.map.structure(Location(0)).is_some());
        assert_eq!(state.players[0].money, 10);
        assert_eq!(ctx.last_error(), Some(MessageId::NotEnoughCash));

        let reports = reports.lock().expect("reports lock");
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].success);
    }

    fn short_of_cash(
        exec: &mut Executor<'_>,
        _location: Location,
        flags: ExecFlags,
        _p1: u32,
        _p2: u32,
    ) -> CommandResult {
        if flags.contains(ExecFlags::EXEC) {
            exec.context_mut().record_shortfall(40);
        }
        Ok(0)
    }

    #[test]
    fn zero_cost_commit_with_shortfall_is_rejected() {
        let registry = CommandRegistry::builder()
            .register("short_of_cash", CommandFlags::empty(), short_of_cash)
            .build();
        let mut state = create_test_state(10);
        let mut ctx = ExecutionContext::new();
        let (reports, callback) = recording_callback();

        let command = Command::new(CommandId(0), PlayerId(0), Location(3), 0, 0);
        let outcome = Dispatcher::offline(&mut state, &registry, &mut ctx)
            .dispatch(command, Some(callback));

        assert_eq!(
            outcome.error(),
            Some(&CommandError::rejected(MessageId::NotEnoughCash))
        );
        assert_eq!(ctx.additional_cash_required(), 40);
        assert!(!reports.lock().expect("reports lock")[0].success);
    }

    #[test]
    fn no_test_commit_reports_no_parity() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        state.map.place(
            Location(0),
            Structure {
                owner: PlayerId(0),
                kind: StructureKind::House,
            },
        );
        let mut ctx = ExecutionContext::new();

        let command = Command::new(CLEAR_AREA, PlayerId(0), Location(0), 1, 1);
        let outcome = Dispatcher::offline(&mut state, &registry, &mut ctx).dispatch(command, None);

        assert_eq!(
            outcome,
            DispatchOutcome::Applied {
                cost: 25,
                trial: None
            }
        );
        assert_eq!(outcome.parity_mismatch(), None);
        assert_eq!(state.players[0].money, 975);
    }

    #[test]
    fn apply_replays_and_settles() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        let mut ctx = ExecutionContext::new();
        let (reports, callback) = recording_callback();

        let outcome = Dispatcher::offline(&mut state, &registry, &mut ctx)
            .apply(&build_house(1, 9), Some(callback));

        assert!(outcome.is_accepted());
        assert_eq!(state.players[1].money, 900);
        assert!(reports.lock().expect("reports lock")[0].success);
    }

    #[test]
    fn apply_reports_late_failures() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        state.map.place(
            Location(9),
            Structure {
                owner: PlayerId(0),
                kind: StructureKind::Road,
            },
        );
        let mut ctx = ExecutionContext::new();

        let outcome =
            Dispatcher::offline(&mut state, &registry, &mut ctx).apply(&build_house(1, 9), None);
        assert_eq!(
            outcome.error(),
            Some(&CommandError::rejected(MessageId::TileOccupied))
        );
    }

    #[test]
    fn unknown_command_is_rejected_at_admission() {
        let registry = CommandRegistry::standard();
        let mut state = create_test_state(1_000);
        let mut ctx = ExecutionContext::new();

        let command = Command::new(CommandId(999), PlayerId(0), Location(1), 0, 0);
        let outcome = Dispatcher::offline(&mut state, &registry, &mut ctx).dispatch(command, None);
        assert_eq!(
            outcome.error(),
            Some(&CommandError::UnknownCommand(CommandId(999)))
        );
    }
}
