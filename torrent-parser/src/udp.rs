//! Message codec for the UDP tracker protocol.
//!
//! Every function here is pure: requests are written into fixed-size
//! buffers and responses are validated before any field is read. All
//! integers on the wire are big-endian.

use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
};

use byteorder::{BigEndian, ByteOrder};

use crate::error::TorrentParserError;

pub const PROTOCOL_ID: u64 = 0x0000_0417_2710_1980;
pub const ACTION_CONNECT: u32 = 0;
pub const ACTION_ANNOUNCE: u32 = 1;

pub const CONNECT_REQUEST_LEN: usize = 16;
pub const CONNECT_RESPONSE_LEN: usize = 16;
pub const ANNOUNCE_REQUEST_LEN: usize = 98;
pub const ANNOUNCE_RESPONSE_HEADER_LEN: usize = 20;
pub const COMPACT_PEER_LEN: usize = 6;

/// Per-request correlation token, echoed back by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u32);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Connection token handed out by the tracker.
///
/// Kept as the raw 8 bytes: it has no arithmetic meaning and must be echoed
/// back unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub [u8; 8]);

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId(")?;
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnnounceEvent {
    #[default]
    None,
    Completed,
    Started,
    Stopped,
}

impl AnnounceEvent {
    pub fn as_udp_id(&self) -> u32 {
        match self {
            AnnounceEvent::None => 0,
            AnnounceEvent::Completed => 1,
            AnnounceEvent::Started => 2,
            AnnounceEvent::Stopped => 3,
        }
    }
}

/// Everything the announce request carries besides the connection and
/// transaction ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceParams {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub downloaded: u64,
    pub left: u64,
    pub uploaded: u64,
    pub event: AnnounceEvent,
    pub key: u32,
    pub num_want: i32,
    pub port: u16,
}

impl AnnounceParams {
    /// Parameters for a fresh download: nothing transferred yet, `left`
    /// set to the full content size and the tracker's default peer count.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], left: u64, port: u16, key: u32) -> Self {
        AnnounceParams {
            info_hash,
            peer_id,
            downloaded: 0,
            left,
            uploaded: 0,
            event: AnnounceEvent::None,
            key,
            num_want: -1,
            port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerEndpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerEndpoint {
    fn from_compact(bytes: &[u8]) -> Self {
        PeerEndpoint {
            ip: Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]),
            port: BigEndian::read_u16(&bytes[4..6]),
        }
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Connect,
    Announce,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub action: u32,
    pub transaction_id: TransactionId,
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    pub action: u32,
    pub transaction_id: TransactionId,
    pub interval: u32,
    pub leechers: u32,
    pub seeders: u32,
    pub peers: Vec<PeerEndpoint>,
}

pub fn encode_connect_request(transaction_id: TransactionId) -> [u8; CONNECT_REQUEST_LEN] {
    let mut buf = [0u8; CONNECT_REQUEST_LEN];
    BigEndian::write_u64(&mut buf[0..8], PROTOCOL_ID);
    BigEndian::write_u32(&mut buf[8..12], ACTION_CONNECT);
    BigEndian::write_u32(&mut buf[12..16], transaction_id.0);
    buf
}

pub fn decode_connect_response(bytes: &[u8]) -> Result<ConnectResponse, TorrentParserError> {
    if bytes.len() < CONNECT_RESPONSE_LEN {
        return Err(TorrentParserError::MalformedResponse(format!(
            "connect response is {} bytes, expected at least {}",
            bytes.len(),
            CONNECT_RESPONSE_LEN
        )));
    }

    let mut connection_id = [0u8; 8];
    connection_id.copy_from_slice(&bytes[8..16]);

    Ok(ConnectResponse {
        action: BigEndian::read_u32(&bytes[0..4]),
        transaction_id: TransactionId(BigEndian::read_u32(&bytes[4..8])),
        connection_id: ConnectionId(connection_id),
    })
}

pub fn encode_announce_request(
    connection_id: ConnectionId,
    transaction_id: TransactionId,
    params: &AnnounceParams,
) -> [u8; ANNOUNCE_REQUEST_LEN] {
    let mut buf = [0u8; ANNOUNCE_REQUEST_LEN];
    buf[0..8].copy_from_slice(&connection_id.0);
    BigEndian::write_u32(&mut buf[8..12], ACTION_ANNOUNCE);
    BigEndian::write_u32(&mut buf[12..16], transaction_id.0);
    buf[16..36].copy_from_slice(&params.info_hash);
    buf[36..56].copy_from_slice(&params.peer_id);
    BigEndian::write_u64(&mut buf[56..64], params.downloaded);
    BigEndian::write_u64(&mut buf[64..72], params.left);
    BigEndian::write_u64(&mut buf[72..80], params.uploaded);
    BigEndian::write_u32(&mut buf[80..84], params.event.as_udp_id());
    // 84..88 is the IP address, left at 0 so the tracker uses the source address
    BigEndian::write_u32(&mut buf[88..92], params.key);
    BigEndian::write_i32(&mut buf[92..96], params.num_want);
    BigEndian::write_u16(&mut buf[96..98], params.port);
    buf
}

pub fn decode_announce_response(bytes: &[u8]) -> Result<AnnounceResponse, TorrentParserError> {
    if bytes.len() < ANNOUNCE_RESPONSE_HEADER_LEN {
        return Err(TorrentParserError::MalformedResponse(format!(
            "announce response is {} bytes, expected at least {}",
            bytes.len(),
            ANNOUNCE_RESPONSE_HEADER_LEN
        )));
    }

    let body = &bytes[ANNOUNCE_RESPONSE_HEADER_LEN..];
    if body.len() % COMPACT_PEER_LEN != 0 {
        return Err(TorrentParserError::MalformedResponse(format!(
            "peer list of {} bytes is not a multiple of {}",
            body.len(),
            COMPACT_PEER_LEN
        )));
    }

    Ok(AnnounceResponse {
        action: BigEndian::read_u32(&bytes[0..4]),
        transaction_id: TransactionId(BigEndian::read_u32(&bytes[4..8])),
        interval: BigEndian::read_u32(&bytes[8..12]),
        leechers: BigEndian::read_u32(&bytes[12..16]),
        seeders: BigEndian::read_u32(&bytes[16..20]),
        peers: body
            .chunks_exact(COMPACT_PEER_LEN)
            .map(PeerEndpoint::from_compact)
            .collect(),
    })
}

/// Looks only at the action field. Buffers too short to hold one are
/// `Unknown`.
pub fn classify_response(bytes: &[u8]) -> ResponseKind {
    match action_of(bytes) {
        Some(ACTION_CONNECT) => ResponseKind::Connect,
        Some(ACTION_ANNOUNCE) => ResponseKind::Announce,
        _ => ResponseKind::Unknown,
    }
}

pub fn action_of(bytes: &[u8]) -> Option<u32> {
    bytes.get(0..4).map(BigEndian::read_u32)
}

/// Transaction id of any response, read without validating the rest.
pub fn transaction_id_of(bytes: &[u8]) -> Option<TransactionId> {
    bytes
        .get(4..8)
        .map(|field| TransactionId(BigEndian::read_u32(field)))
}
