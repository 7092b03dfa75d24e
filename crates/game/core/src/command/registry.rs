use crate::engine::Executor;
use crate::state::Location;

use super::{CommandError, CommandFlags, CommandId, CommandResult, ExecFlags};

/// Uniform handler signature.
///
/// A handler must not mutate world state unless `flags` contains
/// [`ExecFlags::EXEC`]. Nested commands are issued through
/// [`Executor::execute`].
pub type CommandHandler = fn(&mut Executor<'_>, Location, ExecFlags, u32, u32) -> CommandResult;

#[derive(Clone, Copy, Debug)]
pub struct CommandEntry {
    pub name: &'static str,
    pub flags: CommandFlags,
    pub handler: CommandHandler,
}

/// Append-only table of command handlers indexed by [`CommandId`].
///
/// Built once through [`RegistryBuilder`]; read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct CommandRegistry {
    entries: Vec<CommandEntry>,
}

impl CommandRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn lookup(&self, id: CommandId) -> Result<&CommandEntry, CommandError> {
        self.entries
            .get(usize::from(id.0))
            .ok_or(CommandError::UnknownCommand(id))
    }

    pub fn contains(&self, id: CommandId) -> bool {
        usize::from(id.0) < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CommandId, &CommandEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (CommandId(index as u16), entry))
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<CommandEntry>,
}

impl RegistryBuilder {
    /// Appends a handler; its id is the number of handlers registered before it.
    pub fn register(
        mut self,
        name: &'static str,
        flags: CommandFlags,
        handler: CommandHandler,
    ) -> Self {
        self.entries.push(CommandEntry {
            name,
            flags,
            handler,
        });
        self
    }

    /// Id the next [`register`](Self::register) call will receive.
    pub fn next_id(&self) -> CommandId {
        CommandId(self.entries.len() as u16)
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            entries: self.entries,
        }
    }
}
