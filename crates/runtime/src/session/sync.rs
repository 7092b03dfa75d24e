//! Checkpoint verification and commit-failure accounting.
use std::collections::{BTreeMap, VecDeque};

use game_core::Fingerprint;

/// Result of comparing a checkpoint with the local fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Verified {
        frame: u32,
    },
    Mismatch {
        frame: u32,
        local: Fingerprint,
        expected: Fingerprint,
    },
    /// The checkpoint refers to a frame no longer in the local history.
    Missed {
        frame: u32,
    },
}

/// Matches authority checkpoints against locally computed fingerprints.
///
/// A checkpoint for a frame not yet simulated waits until that frame is
/// recorded; one for a frame already simulated is checked against the
/// bounded history. Each checkpoint is consumed exactly once.
#[derive(Debug)]
pub struct SyncVerifier {
    history: VecDeque<(u32, Fingerprint)>,
    capacity: usize,
    pending: BTreeMap<u32, Fingerprint>,
    double_word: bool,
}

impl SyncVerifier {
    pub fn new(capacity: usize, double_word: bool) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            pending: BTreeMap::new(),
            double_word,
        }
    }

    /// Last frame recorded, if any.
    pub fn last_frame(&self) -> Option<u32> {
        self.history.back().map(|(frame, _)| *frame)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Registers an authority checkpoint.
    pub fn checkpoint(&mut self, frame: u32, expected: Fingerprint) -> Option<Verification> {
        match self.last_frame() {
            Some(last) if frame <= last => Some(
                match self.history.iter().find(|(recorded, _)| *recorded == frame) {
                    Some(&(_, local)) => self.compare(frame, local, expected),
                    None => Verification::Missed { frame },
                },
            ),
            _ => {
                self.pending.insert(frame, expected);
                None
            }
        }
    }

    /// Records the fingerprint computed at the end of `frame` and resolves
    /// any checkpoint waiting for it. Checkpoints for frames that were
    /// skipped over are reported as missed.
    pub fn record(&mut self, frame: u32, local: Fingerprint) -> Vec<Verification> {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back((frame, local));

        let later = self.pending.split_off(&frame.saturating_add(1));
        let resolved = std::mem::replace(&mut self.pending, later);
        resolved
            .into_iter()
            .map(|(checkpoint, expected)| {
                if checkpoint == frame {
                    self.compare(frame, local, expected)
                } else {
                    Verification::Missed { frame: checkpoint }
                }
            })
            .collect()
    }

    fn compare(&self, frame: u32, local: Fingerprint, expected: Fingerprint) -> Verification {
        if local.matches(&expected, self.double_word) {
            Verification::Verified { frame }
        } else {
            Verification::Mismatch {
                frame,
                local,
                expected,
            }
        }
    }
}

/// Counts commands that failed when applied after passing their trial.
#[derive(Debug)]
pub struct CommitFailureTracker {
    frames: VecDeque<u32>,
    max_failures: usize,
    window: u32,
}

impl CommitFailureTracker {
    pub fn new(max_failures: usize, window: u32) -> Self {
        Self {
            frames: VecDeque::new(),
            max_failures,
            window: window.max(1),
        }
    }

    /// Records a failure at `frame`. Returns `true` once more than the
    /// tolerated number of failures fall inside the window.
    pub fn record(&mut self, frame: u32) -> bool {
        self.frames.push_back(frame);
        while let Some(&oldest) = self.frames.front() {
            if oldest.saturating_add(self.window) <= frame {
                self.frames.pop_front();
            } else {
                break;
            }
        }
        self.frames.len() > self.max_failures
    }

    /// Failures currently inside the window.
    pub fn recent(&self) -> usize {
        self.frames.len()
    }

    pub fn window(&self) -> u32 {
        self.window
    }
}
