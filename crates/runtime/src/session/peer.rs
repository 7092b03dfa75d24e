//! Authority-side view of a connected follower.
use game_core::PlayerId;

use crate::config::RuntimeConfig;
use crate::net::ServerLink;
use crate::protocol::{FramedCommand, PeerId, ServerPacket};

/// Where a follower is in the join handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum PeerStatus {
    /// Connected, `Join` not received yet.
    Connected,
    /// Welcomed; catching up with the authority's frame.
    PreActive,
    /// Acknowledged a frame close to the authority's.
    Active,
}

/// What the lag check decided for a peer this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LagVerdict {
    Healthy,
    /// First time over one ack interval since the peer last recovered.
    Lagging(u32),
    Drop(u32),
}

pub struct Peer {
    pub id: PeerId,
    pub link: ServerLink,
    pub status: PeerStatus,
    pub name: String,
    pub player: PlayerId,
    /// Last frame the peer acknowledged.
    pub last_frame: u32,
    /// Authority frame when that acknowledgement arrived.
    pub last_frame_server: u32,
    lag_warned: bool,
    outbox: Vec<FramedCommand>,
}

impl Peer {
    pub fn new(id: PeerId, link: ServerLink, frame: u32) -> Self {
        Self {
            id,
            link,
            status: PeerStatus::Connected,
            name: String::new(),
            player: PlayerId::SPECTATOR,
            last_frame: frame,
            last_frame_server: frame,
            lag_warned: false,
            outbox: Vec::new(),
        }
    }

    /// Welcomed peers receive commands, frames and checkpoints.
    pub fn is_joined(&self) -> bool {
        self.status != PeerStatus::Connected
    }

    pub fn acknowledge(&mut self, acked: u32, server_frame: u32) {
        self.last_frame = acked;
        self.last_frame_server = server_frame;
    }

    /// Buffers a command until the next flush.
    pub fn enqueue(&mut self, command: FramedCommand) {
        self.outbox.push(command);
    }

    /// Sends every buffered command. Stops at the first link failure.
    pub fn flush(&mut self) -> Result<usize, crate::net::LinkError> {
        let count = self.outbox.len();
        for command in self.outbox.drain(..) {
            self.link.send(ServerPacket::Command(command))?;
        }
        Ok(count)
    }

    /// Frames the peer is behind the authority.
    ///
    /// The distance between acknowledgement and authority frame, plus the
    /// time since the ack once it is overdue by more than one interval.
    pub fn lag(&self, frame: u32, config: &RuntimeConfig) -> u32 {
        let mut lag = self.last_frame_server.saturating_sub(self.last_frame);
        let grace = self
            .last_frame_server
            .saturating_add(config.lag.ack_interval)
            .saturating_add(config.sync.frame_freq);
        if grace < frame {
            lag = lag.saturating_add(frame - grace);
        }
        lag
    }

    pub fn check_lag(&mut self, frame: u32, config: &RuntimeConfig) -> LagVerdict {
        let lag = self.lag(frame, config);
        match self.status {
            PeerStatus::Active => {
                if lag > config.drop_threshold() {
                    LagVerdict::Drop(lag)
                } else if lag > config.lag.ack_interval {
                    if self.lag_warned {
                        LagVerdict::Healthy
                    } else {
                        self.lag_warned = true;
                        LagVerdict::Lagging(lag)
                    }
                } else {
                    self.lag_warned = false;
                    LagVerdict::Healthy
                }
            }
            PeerStatus::Connected | PeerStatus::PreActive => {
                if lag > config.lag.max_join_frames {
                    LagVerdict::Drop(lag)
                } else {
                    LagVerdict::Healthy
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::memory;

    fn peer(status: PeerStatus) -> Peer {
        let (link, _client) = memory::pair("test");
        let mut peer = Peer::new(PeerId(1), link, 0);
        peer.status = status;
        peer
    }

    #[test]
    fn lag_is_ack_distance_until_overdue() {
        let config = RuntimeConfig::default();
        let mut peer = peer(PeerStatus::Active);
        peer.acknowledge(90, 100);
        assert_eq!(peer.lag(100, &config), 10);
        // 100 + 74 + 1 = 175 is the last frame without extra lag.
        assert_eq!(peer.lag(175, &config), 10);
        assert_eq!(peer.lag(185, &config), 20);
    }

    #[test]
    fn active_peer_is_warned_once_then_dropped() {
        let config = RuntimeConfig::default();
        let mut peer = peer(PeerStatus::Active);
        peer.acknowledge(0, 0);

        assert_eq!(peer.check_lag(100, &config), LagVerdict::Healthy);
        assert_eq!(peer.check_lag(160, &config), LagVerdict::Lagging(85));
        assert_eq!(peer.check_lag(170, &config), LagVerdict::Healthy);

        let over = config.drop_threshold() + 76;
        assert!(matches!(peer.check_lag(over, &config), LagVerdict::Drop(_)));
    }

    #[test]
    fn warning_rearms_after_recovery() {
        let config = RuntimeConfig::default();
        let mut peer = peer(PeerStatus::Active);
        peer.acknowledge(0, 0);
        assert!(matches!(peer.check_lag(160, &config), LagVerdict::Lagging(_)));

        peer.acknowledge(160, 160);
        assert_eq!(peer.check_lag(161, &config), LagVerdict::Healthy);
        assert!(matches!(peer.check_lag(320, &config), LagVerdict::Lagging(_)));
    }

    #[test]
    fn joining_peer_uses_join_limit() {
        let config = RuntimeConfig::default();
        let mut peer = peer(PeerStatus::PreActive);
        peer.acknowledge(0, 0);
        let limit = config.lag.max_join_frames + config.lag.ack_interval + 1;
        assert_eq!(peer.check_lag(limit, &config), LagVerdict::Healthy);
        assert!(matches!(
            peer.check_lag(limit + 1, &config),
            LagVerdict::Drop(_)
        ));
    }
}
