//! Applying replicated commands and reporting dispatch outcomes.
use tracing::{debug, error, warn};

use game_core::{
    Command, CommandRegistry, DispatchOutcome, Dispatcher, ExecutionContext, GameError,
    GameState,
};

use crate::events::{CommandEvent, EventBus};
use crate::protocol::{FramedCommand, PeerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Applied {
    Committed,
    Failed,
}

impl Applied {
    pub(crate) fn is_success(self) -> bool {
        self == Self::Committed
    }
}

/// Commits a command that reached its target frame.
///
/// Failures are logged and reported, never propagated: the command passed
/// its trial where it was submitted and every instance fails it alike.
pub(crate) fn apply(
    state: &mut GameState,
    registry: &CommandRegistry,
    ctx: &mut ExecutionContext,
    events: &EventBus,
    framed: &FramedCommand,
) -> Applied {
    let command = &framed.command;
    let outcome = Dispatcher::offline(state, registry, ctx).apply(command, None);

    if let Some((trial, commit)) = outcome.parity_mismatch() {
        error!(
            target: "command",
            frame = framed.frame,
            command = %command.id,
            trial,
            commit,
            "trial and commit cost differ"
        );
    }

    match outcome {
        DispatchOutcome::Applied { cost, .. } => {
            debug!(
                target: "command",
                frame = framed.frame,
                origin = %framed.origin,
                command = %command.id,
                player = %command.player,
                cost,
                "command applied"
            );
            events.publish(CommandEvent::Applied {
                command: command.clone(),
                origin: framed.origin,
                frame: framed.frame,
                cost,
            });
            Applied::Committed
        }
        DispatchOutcome::Rejected { phase, error } => {
            let severity = error.severity();
            if severity.is_internal() {
                error!(
                    target: "command",
                    frame = framed.frame,
                    origin = %framed.origin,
                    command = %command.id,
                    player = %command.player,
                    %phase,
                    code = error.error_code(),
                    severity = severity.as_str(),
                    %error,
                    "command failed when applied"
                );
            } else {
                warn!(
                    target: "command",
                    frame = framed.frame,
                    origin = %framed.origin,
                    command = %command.id,
                    player = %command.player,
                    %phase,
                    code = error.error_code(),
                    %error,
                    "command failed when applied"
                );
            }
            events.publish(CommandEvent::Failed {
                command: command.clone(),
                origin: framed.origin,
                frame: framed.frame,
                phase,
                error: error.to_string(),
            });
            Applied::Failed
        }
        DispatchOutcome::Queued | DispatchOutcome::Estimated(_) => Applied::Failed,
    }
}

/// Publishes the outcome of a local dispatch.
///
/// `frame` is the frame a queued command was stamped for, or the current
/// frame for anything committed or refused on the spot.
pub(crate) fn publish_dispatch(
    events: &EventBus,
    origin: PeerId,
    frame: u32,
    command: Command,
    outcome: &DispatchOutcome,
) {
    let event = match outcome {
        DispatchOutcome::Queued => CommandEvent::Queued {
            command,
            frame: Some(frame),
        },
        DispatchOutcome::Applied { cost, .. } => CommandEvent::Applied {
            command,
            origin,
            frame,
            cost: *cost,
        },
        DispatchOutcome::Estimated(result) => CommandEvent::Estimated {
            command,
            cost: result.as_ref().ok().copied(),
            error: result.as_ref().err().map(ToString::to_string),
        },
        DispatchOutcome::Rejected { phase, error } => {
            debug!(
                target: "command",
                command = %command.id,
                %phase,
                %error,
                "command rejected"
            );
            CommandEvent::Rejected {
                command,
                phase: *phase,
                error: error.to_string(),
            }
        }
    };
    events.publish(event);
}
