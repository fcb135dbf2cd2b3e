//! Addressing of realtime messages.

use serde::{Deserialize, Serialize};

use browserhub_core::types::{ConnectionId, RoomId};

/// Recipient of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    /// Every connection in a room.
    Room(RoomId),
    /// One connection.
    Connection(ConnectionId),
}

impl Target {
    /// Pub/sub channel name under `prefix`.
    pub fn channel_name(&self, prefix: &str) -> String {
        match self {
            Self::Room(id) => format!("{prefix}:room:{id}"),
            Self::Connection(id) => format!("{prefix}:connection:{id}"),
        }
    }

    /// Recover the target from a channel name built by [`Target::channel_name`].
    pub fn from_channel_name(prefix: &str, channel: &str) -> Option<Self> {
        let rest = channel.strip_prefix(prefix)?.strip_prefix(':')?;
        let (kind, id) = rest.split_once(':')?;
        match kind {
            "room" => id.parse().ok().map(Self::Room),
            "connection" => id.parse().ok().map(Self::Connection),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name_parses_back() {
        let room = Target::Room(RoomId::new());
        let conn = Target::Connection(ConnectionId::new());
        for target in [room, conn] {
            let name = target.channel_name("browserhub:events");
            assert_eq!(
                Target::from_channel_name("browserhub:events", &name),
                Some(target)
            );
        }
    }

    #[test]
    fn test_foreign_channels_are_ignored() {
        assert_eq!(Target::from_channel_name("bh", "other:room:x"), None);
        assert_eq!(Target::from_channel_name("bh", "bh:room:not-a-uuid"), None);
        assert_eq!(
            Target::from_channel_name("bh", &format!("bh:session:{}", RoomId::new())),
            None
        );
    }
}
