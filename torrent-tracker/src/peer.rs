use std::{fmt, sync::OnceLock};

use rand::Rng;
use tracing::debug;

pub const PEER_ID_LEN: usize = 20;
const TAG_LEN: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; PEER_ID_LEN]);

impl PeerId {
    pub fn tag(&self) -> &[u8] {
        &self.0[..TAG_LEN]
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({}", String::from_utf8_lossy(self.tag()))?;
        for byte in &self.0[TAG_LEN..] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// The client's peer id, generated on first use and then fixed.
///
/// The first 8 bytes are an Azureus-style tag such as `-RT0001-`, the
/// remaining 12 are random. Concurrent first calls to [`PeerIdentity::current`]
/// all observe the same id.
pub struct PeerIdentity {
    tag: [u8; TAG_LEN],
    id: OnceLock<PeerId>,
}

impl PeerIdentity {
    pub fn new(specifier: &[char; 2], version: &[char; 4]) -> Self {
        let mut tag = [b'-'; TAG_LEN];
        for (slot, c) in tag[1..TAG_LEN - 1]
            .iter_mut()
            .zip(specifier.iter().chain(version.iter()))
        {
            // the tag must stay 8 single-byte characters
            *slot = if c.is_ascii() { *c as u8 } else { b'0' };
        }

        PeerIdentity {
            tag,
            id: OnceLock::new(),
        }
    }

    pub fn current(&self) -> PeerId {
        *self.id.get_or_init(|| {
            let mut id = [0u8; PEER_ID_LEN];
            rand::rng().fill(&mut id[..]);
            id[..TAG_LEN].copy_from_slice(&self.tag);
            let id = PeerId(id);
            debug!(peer_id = ?id, "generated peer id");
            id
        })
    }
}

impl Default for PeerIdentity {
    fn default() -> Self {
        PeerIdentity::new(&['R', 'T'], &['0', '0', '0', '1'])
    }
}
