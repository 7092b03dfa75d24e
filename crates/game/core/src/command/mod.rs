//! Command values, the handler table and the built-in command set.
//!
//! A [`Command`] is a plain value describing one intent. It can be queued,
//! sent to peers and replayed; the world it acts on is supplied only when it
//! is executed. Handlers are looked up by [`CommandId`] in a
//! [`CommandRegistry`] that is built once and never changes afterwards.
pub mod builtin;
mod error;
mod flags;
mod registry;

pub use error::{CommandError, CommandResult, MessageId};
pub use flags::{CommandFlags, DispatchOptions, ExecFlags};
pub use registry::{CommandEntry, CommandHandler, CommandRegistry, RegistryBuilder};

use std::fmt;

use arrayvec::ArrayString;

use crate::config::GameConfig;
use crate::state::{Location, PlayerId};

/// Stable numeric command identifier. Ids must match across peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommandId(pub u16);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// Bounded text payload carried by a command (names, chat-like strings).
pub type CommandText = ArrayString<{ GameConfig::MAX_TEXT_LEN }>;

/// One intent to mutate world state.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Command {
    pub id: CommandId,
    /// Party the command acts on behalf of.
    pub player: PlayerId,
    pub location: Location,
    pub p1: u32,
    pub p2: u32,
    pub options: DispatchOptions,
    pub text: Option<CommandText>,
}

impl Command {
    pub fn new(id: CommandId, player: PlayerId, location: Location, p1: u32, p2: u32) -> Self {
        Self {
            id,
            player,
            location,
            p1,
            p2,
            options: DispatchOptions::empty(),
            text: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Attaches a text payload. Returns `None` when `text` exceeds
    /// [`GameConfig::MAX_TEXT_LEN`] bytes.
    #[must_use]
    pub fn with_text(mut self, text: &str) -> Option<Self> {
        self.text = Some(CommandText::from(text).ok()?);
        Some(self)
    }

    /// Result report for this command, used for completion callbacks.
    pub fn report(&self, success: bool) -> CommandReport {
        CommandReport {
            success,
            location: self.location,
            p1: self.p1,
            p2: self.p2,
        }
    }
}

/// Argument passed to a completion callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandReport {
    pub success: bool,
    pub location: Location,
    pub p1: u32,
    pub p2: u32,
}

/// Completion callback. Invoked exactly once per dispatch that supplied one.
pub type CommandCallback = Box<dyn FnOnce(CommandReport) + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_is_bounded() {
        let command = Command::new(CommandId(0), PlayerId(0), Location(1), 0, 0);
        assert!(command.clone().with_text("depot").is_some());
        let long = "x".repeat(GameConfig::MAX_TEXT_LEN + 1);
        assert!(command.with_text(&long).is_none());
    }

    #[test]
    fn report_copies_parameters() {
        let command = Command::new(CommandId(3), PlayerId(1), Location(9), 4, 5);
        let report = command.report(true);
        assert!(report.success);
        assert_eq!((report.location, report.p1, report.p2), (Location(9), 4, 5));
    }
}
