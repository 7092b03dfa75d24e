use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use game_core::PlayerId;

/// Port used when a connection string does not name one.
pub const DEFAULT_PORT: u16 = 3979;

/// Parsed `host[:port][#player]` connection string. IPv6 hosts with a port
/// are written `[addr]:port`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionString {
    pub host: String,
    pub port: u16,
    /// Participant slot requested when joining.
    pub player: Option<PlayerId>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("connection string has no host")]
    EmptyHost,

    #[error("invalid port {0:?}")]
    InvalidPort(String),

    #[error("invalid player {0:?}")]
    InvalidPlayer(String),

    #[error("unterminated '[' in host")]
    UnclosedBracket,
}

impl ConnectionString {
    /// `host:port` form accepted by socket address resolution.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ConnectionString {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        let (address, player) = match input.rsplit_once('#') {
            Some((address, player)) => {
                let id = player
                    .parse::<u8>()
                    .map_err(|_| AddressError::InvalidPlayer(player.to_string()))?;
                (address, Some(PlayerId(id)))
            }
            None => (input, None),
        };

        let (host, port) = if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or(AddressError::UnclosedBracket)?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(AddressError::InvalidPort(tail.to_string())),
            }
        } else if address.matches(':').count() == 1 {
            let (host, port) = address.split_once(':').unwrap_or((address, ""));
            (host, Some(port))
        } else {
            (address, None)
        };

        if host.is_empty() {
            return Err(AddressError::EmptyHost);
        }
        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| AddressError::InvalidPort(port.to_string()))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            port,
            player,
        })
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())?;
        if let Some(player) = self.player {
            write!(f, "#{}", player.0)?;
        }
        Ok(())
    }
}
