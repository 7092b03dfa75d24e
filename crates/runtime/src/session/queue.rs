//! Frame-ordered command queue.
use std::collections::BTreeMap;

use crate::protocol::FramedCommand;

/// Commands waiting for their target frame.
///
/// Entries are ordered by target frame first and arrival second, so a
/// command stamped for an earlier frame is always applied first even when
/// it arrived later, and commands sharing a frame keep the authority's order.
#[derive(Debug, Default)]
pub struct CommandQueue {
    entries: BTreeMap<(u32, u64), FramedCommand>,
    next_seq: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: FramedCommand) {
        let key = (command.frame, self.next_seq);
        self.next_seq += 1;
        self.entries.insert(key, command);
    }

    /// Removes and returns every command whose target frame is at or before
    /// `frame`, in application order.
    pub fn drain_due(&mut self, frame: u32) -> Vec<FramedCommand> {
        let later = self.entries.split_off(&(frame.saturating_add(1), 0));
        let due = std::mem::replace(&mut self.entries, later);
        due.into_values().collect()
    }

    /// Commands stamped for frames after `frame`, in application order.
    pub fn pending_after(&self, frame: u32) -> impl Iterator<Item = &FramedCommand> {
        self.entries
            .range((frame.saturating_add(1), 0)..)
            .map(|(_, command)| command)
    }

    /// Highest target frame currently queued.
    pub fn last_frame(&self) -> Option<u32> {
        self.entries.keys().next_back().map(|(frame, _)| *frame)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
