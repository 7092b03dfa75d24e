//! In-process links for running several instances in one process.
use tokio::sync::mpsc;

use super::{ClientLink, ServerLink};

/// Connected authority/follower link ends. Packets are handed over as
/// values; ordering matches a stream transport.
pub fn pair(label: &str) -> (ServerLink, ClientLink) {
    let (to_client, from_server) = mpsc::unbounded_channel();
    let (to_server, from_client) = mpsc::unbounded_channel();

    let server = ServerLink::new_direct(to_client, from_client, format!("memory:{label}"));
    let client = ClientLink::new_direct(to_server, from_server, format!("memory:{label}"));
    (server, client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::LinkError;
    use crate::protocol::{ClientPacket, ServerPacket};

    #[test]
    fn packets_cross_in_order() {
        let (mut server, mut client) = pair("test");
        client.send(ClientPacket::Ack { frame: 1 }).expect("send");
        client.send(ClientPacket::Ack { frame: 2 }).expect("send");

        assert_eq!(
            server.try_recv().expect("recv"),
            Some(ClientPacket::Ack { frame: 1 })
        );
        assert_eq!(
            server.try_recv().expect("recv"),
            Some(ClientPacket::Ack { frame: 2 })
        );
        assert_eq!(server.try_recv().expect("recv"), None);
    }

    #[test]
    fn closing_one_end_is_seen_by_the_other() {
        let (mut server, mut client) = pair("test");
        server.send(ServerPacket::Shutdown).expect("send");
        server.close();

        assert_eq!(client.try_recv().expect("recv"), Some(ServerPacket::Shutdown));
        assert!(matches!(client.try_recv(), Err(LinkError::Closed)));
        assert!(matches!(
            server.send(ServerPacket::Shutdown),
            Err(LinkError::Closed)
        ));
    }
}
