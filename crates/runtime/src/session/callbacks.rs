//! Completion callbacks for commands in flight.
use std::collections::HashMap;

use game_core::{Command, CommandCallback, CommandReport};

use crate::protocol::CallbackToken;

struct Pending {
    report: CommandReport,
    callback: CommandCallback,
}

/// Callbacks of locally dispatched commands that were handed to the network.
///
/// Only a token travels with the command; the closure stays here until the
/// command is applied at its target frame. Anything still pending when the
/// table is dropped fires with failure, so every callback runs exactly once.
#[derive(Default)]
pub struct PendingCallbacks {
    next: u32,
    pending: HashMap<CallbackToken, Pending>,
}

impl PendingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, command: &Command, callback: CommandCallback) -> CallbackToken {
        let token = CallbackToken(self.next);
        self.next = self.next.wrapping_add(1);
        self.pending.insert(
            token,
            Pending {
                report: command.report(false),
                callback,
            },
        );
        token
    }

    /// Fires the callback registered under `token`. Returns `false` for
    /// unknown tokens.
    pub fn complete(&mut self, token: CallbackToken, success: bool) -> bool {
        match self.pending.remove(&token) {
            Some(pending) => {
                (pending.callback)(CommandReport {
                    success,
                    ..pending.report
                });
                true
            }
            None => false,
        }
    }

    /// Fires every pending callback with failure.
    pub fn fail_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, pending) in self.pending.drain() {
            (pending.callback)(pending.report);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Drop for PendingCallbacks {
    fn drop(&mut self) {
        self.fail_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_core::{CommandId, Location, PlayerId};
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<bool>>>, CommandCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: CommandCallback = Box::new(move |report: CommandReport| {
            sink.lock().unwrap().push(report.success);
        });
        (seen, callback)
    }

    fn command() -> Command {
        Command::new(CommandId(0), PlayerId(0), Location(3), 1, 2)
    }

    #[test]
    fn completes_once() {
        let mut table = PendingCallbacks::new();
        let (seen, callback) = recorder();
        let token = table.insert(&command(), callback);

        assert!(table.complete(token, true));
        assert!(!table.complete(token, false));
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[test]
    fn dropping_the_table_fails_pending_callbacks() {
        let (seen, callback) = recorder();
        {
            let mut table = PendingCallbacks::new();
            table.insert(&command(), callback);
            assert_eq!(table.len(), 1);
        }
        assert_eq!(*seen.lock().unwrap(), vec![false]);
    }

    #[test]
    fn tokens_are_distinct() {
        let mut table = PendingCallbacks::new();
        let (_, first) = recorder();
        let (_, second) = recorder();
        let a = table.insert(&command(), first);
        let b = table.insert(&command(), second);
        assert_ne!(a, b);
        assert_eq!(table.fail_all(), 2);
        assert!(table.is_empty());
    }
}
