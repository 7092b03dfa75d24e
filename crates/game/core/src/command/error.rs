//! Command failure reasons.

use crate::error::{ErrorSeverity, GameError};
use crate::state::{Money, PlayerId};

use super::CommandId;

/// Message shown to the user when a command is refused.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::IntoStaticStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum MessageId {
    NotEnoughCash,
    TileOccupied,
    OutOfBounds,
    WaterForbidden,
    NotOwner,
    NothingToDemolish,
    InvalidParameter,
    InactivePlayer,
}

impl MessageId {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Reason a command did not produce a cost.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The handler refused the command.
    #[error("command rejected: {}", message.map_or("no reason given", MessageId::as_str))]
    Rejected { message: Option<MessageId> },

    /// Trial cost exceeds the acting participant's funds.
    #[error("insufficient funds: requires {required}, available {available}")]
    InsufficientFunds { required: Money, available: Money },

    /// Networked session is paused and the command is not pause-exempt.
    #[error("session is paused")]
    Paused,

    /// Acting party has no standing to issue this command.
    #[error("{player} may not issue {command}")]
    NoStanding { player: PlayerId, command: CommandId },

    /// Command is restricted to offline play.
    #[error("{0} is only available offline")]
    OfflineOnly(CommandId),

    /// Command is restricted to the authority.
    #[error("{0} may only be issued by the server")]
    ServerOnly(CommandId),

    /// Id has no registered handler.
    #[error("unknown command {0}")]
    UnknownCommand(CommandId),

    /// Participant id outside the participant table.
    #[error("{0} is out of range")]
    InvalidPlayer(PlayerId),
}

impl CommandError {
    pub const fn rejected(message: MessageId) -> Self {
        Self::Rejected {
            message: Some(message),
        }
    }

    /// Message id to surface in the UI, if any.
    pub const fn message(&self) -> Option<MessageId> {
        match self {
            Self::Rejected { message } => *message,
            Self::InsufficientFunds { .. } => Some(MessageId::NotEnoughCash),
            _ => None,
        }
    }
}

impl GameError for CommandError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InsufficientFunds { .. } | Self::Paused => ErrorSeverity::Recoverable,
            Self::Rejected { .. }
            | Self::NoStanding { .. }
            | Self::OfflineOnly(_)
            | Self::ServerOnly(_) => ErrorSeverity::Validation,
            Self::UnknownCommand(_) | Self::InvalidPlayer(_) => ErrorSeverity::Fatal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "COMMAND_REJECTED",
            Self::InsufficientFunds { .. } => "COMMAND_INSUFFICIENT_FUNDS",
            Self::Paused => "COMMAND_PAUSED",
            Self::NoStanding { .. } => "COMMAND_NO_STANDING",
            Self::OfflineOnly(_) => "COMMAND_OFFLINE_ONLY",
            Self::ServerOnly(_) => "COMMAND_SERVER_ONLY",
            Self::UnknownCommand(_) => "COMMAND_UNKNOWN",
            Self::InvalidPlayer(_) => "COMMAND_INVALID_PLAYER",
        }
    }
}

/// Outcome of a single handler or executor call.
pub type CommandResult = Result<Money, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_classified() {
        assert_eq!(
            CommandError::UnknownCommand(CommandId(99)).severity(),
            ErrorSeverity::Fatal
        );
        assert!(
            CommandError::InsufficientFunds {
                required: 500,
                available: 100
            }
            .severity()
            .is_recoverable()
        );
    }

    #[test]
    fn rejection_display_names_message() {
        let err = CommandError::rejected(MessageId::TileOccupied);
        assert_eq!(err.to_string(), "command rejected: tile_occupied");
        assert_eq!(err.message(), Some(MessageId::TileOccupied));
        assert_eq!(err.error_code(), "COMMAND_REJECTED");
    }
}
