//! Session timing and limits.
//!
//! Every instance in a session should run with the same frame parameters;
//! only the authority's values for `command_delay`, `frame_freq` and
//! `sync_interval` actually shape the protocol.
use std::env;
use std::time::Duration;

use thiserror::Error;

/// Runtime configuration for a session member.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub sync: SyncConfig,
    pub lag: LagConfig,
    pub net: NetConfig,
    /// Wall-clock time between two simulation ticks.
    pub tick_interval: Duration,
    /// Capacity of each event bus topic.
    pub event_capacity: usize,
    /// Capacity of the handle-to-worker command channel.
    pub command_buffer: usize,
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Frames between submission and application of a command.
    pub command_delay: u32,
    /// Frames a follower may run ahead of the authority's last grant.
    pub frame_freq: u32,
    /// Frames between two checkpoints.
    pub sync_interval: u32,
    /// Compare both PRNG words at checkpoints.
    pub double_word: bool,
    /// Per-frame fingerprints a follower keeps for late checkpoints.
    pub history_len: usize,
    /// Commit-time failures tolerated within `commit_failure_window` frames.
    pub max_commit_failures: usize,
    pub commit_failure_window: u32,
}

#[derive(Clone, Debug)]
pub struct LagConfig {
    /// Frames between two acknowledgements from a follower.
    pub ack_interval: u32,
    /// Active peers lagging more than this many ack intervals are dropped.
    pub drop_intervals: u32,
    /// Joining peers lagging more than this many frames are dropped.
    pub max_join_frames: u32,
}

#[derive(Clone, Debug)]
pub struct NetConfig {
    pub max_peers: usize,
    /// Largest encoded packet accepted or sent, in bytes.
    pub max_packet_size: usize,
    /// A follower that hears nothing from the authority for this long
    /// considers the connection lost.
    pub connection_timeout: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("frame_freq ({frame_freq}) must be smaller than command_delay ({command_delay})")]
    AllowanceOutrunsDelay { frame_freq: u32, command_delay: u32 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl RuntimeConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `LOCKSTEP_COMMAND_DELAY` - Frames between submit and apply (default: 3)
    /// - `LOCKSTEP_FRAME_FREQ` - Frame allowance step (default: 1)
    /// - `LOCKSTEP_SYNC_INTERVAL` - Frames between checkpoints (default: 10)
    /// - `LOCKSTEP_SYNC_DOUBLE` - Compare both PRNG words (default: true)
    /// - `LOCKSTEP_ACK_INTERVAL` - Frames between follower acks (default: 74)
    /// - `LOCKSTEP_LAG_DROP_INTERVALS` - Ack intervals of lag before drop (default: 3)
    /// - `LOCKSTEP_MAX_JOIN_FRAMES` - Lag allowed while joining (default: 500)
    /// - `LOCKSTEP_MAX_COMMIT_FAILURES` - Late failures tolerated per window (default: 8)
    /// - `LOCKSTEP_COMMIT_FAILURE_WINDOW` - Frames in that window (default: 300)
    /// - `LOCKSTEP_HISTORY_LEN` - Fingerprints kept by a follower (default: 64)
    /// - `LOCKSTEP_TICK_MS` - Milliseconds per tick (default: 30)
    /// - `LOCKSTEP_TIMEOUT_MS` - Follower connection timeout (default: 10000)
    /// - `LOCKSTEP_MAX_PEERS` - Followers accepted by the authority (default: 8)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(delay) = read_env::<u32>("LOCKSTEP_COMMAND_DELAY") {
            config.sync.command_delay = delay;
        }
        if let Some(freq) = read_env::<u32>("LOCKSTEP_FRAME_FREQ") {
            config.sync.frame_freq = freq;
        }
        if let Some(interval) = read_env::<u32>("LOCKSTEP_SYNC_INTERVAL") {
            config.sync.sync_interval = interval.max(1);
        }
        if let Some(double) = read_env::<bool>("LOCKSTEP_SYNC_DOUBLE") {
            config.sync.double_word = double;
        }
        if let Some(failures) = read_env::<usize>("LOCKSTEP_MAX_COMMIT_FAILURES") {
            config.sync.max_commit_failures = failures;
        }
        if let Some(window) = read_env::<u32>("LOCKSTEP_COMMIT_FAILURE_WINDOW") {
            config.sync.commit_failure_window = window.max(1);
        }
        if let Some(len) = read_env::<usize>("LOCKSTEP_HISTORY_LEN") {
            config.sync.history_len = len.max(1);
        }
        if let Some(interval) = read_env::<u32>("LOCKSTEP_ACK_INTERVAL") {
            config.lag.ack_interval = interval.max(1);
        }
        if let Some(intervals) = read_env::<u32>("LOCKSTEP_LAG_DROP_INTERVALS") {
            config.lag.drop_intervals = intervals.max(1);
        }
        if let Some(frames) = read_env::<u32>("LOCKSTEP_MAX_JOIN_FRAMES") {
            config.lag.max_join_frames = frames;
        }
        if let Some(ms) = read_env::<u64>("LOCKSTEP_TICK_MS") {
            config.tick_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = read_env::<u64>("LOCKSTEP_TIMEOUT_MS") {
            config.net.connection_timeout = Duration::from_millis(ms);
        }
        if let Some(peers) = read_env::<usize>("LOCKSTEP_MAX_PEERS") {
            config.net.max_peers = peers;
        }

        config
    }

    /// Rejects settings under which a follower could pass a frame before
    /// the commands for it were sent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.frame_freq >= self.sync.command_delay {
            return Err(ConfigError::AllowanceOutrunsDelay {
                frame_freq: self.sync.frame_freq,
                command_delay: self.sync.command_delay,
            });
        }
        if self.sync.sync_interval == 0 {
            return Err(ConfigError::Zero("sync_interval"));
        }
        if self.lag.ack_interval == 0 {
            return Err(ConfigError::Zero("ack_interval"));
        }
        if self.sync.history_len == 0 {
            return Err(ConfigError::Zero("history_len"));
        }
        Ok(())
    }

    /// Lag, in frames, above which an active peer is dropped.
    pub fn drop_threshold(&self) -> u32 {
        self.lag.ack_interval.saturating_mul(self.lag.drop_intervals)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            lag: LagConfig::default(),
            net: NetConfig::default(),
            tick_interval: Duration::from_millis(30),
            event_capacity: 100,
            command_buffer: 32,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            command_delay: 3,
            frame_freq: 1,
            sync_interval: 10,
            double_word: true,
            history_len: 64,
            max_commit_failures: 8,
            commit_failure_window: 300,
        }
    }
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            ack_interval: 74,
            drop_intervals: 3,
            max_join_frames: 500,
        }
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            max_peers: 8,
            max_packet_size: 1 << 20,
            connection_timeout: Duration::from_secs(10),
        }
    }
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}
