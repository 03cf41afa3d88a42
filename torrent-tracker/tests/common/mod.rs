#![allow(dead_code)]

use std::{io, net::Ipv4Addr};

use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use torrent_parser::{model::TorrentMetadata, parse_torrent_metadata, udp::PeerEndpoint};
use torrent_tracker::Transport;

pub const ANNOUNCE: &str = "udp://tracker.example.org:6969/announce";
pub const CONNECTION_ID: [u8; 8] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x11];

fn b(s: &str) -> String {
    format!("{}:{}", s.len(), s)
}

pub fn metadata_with(announce: &str, lengths: &[i64]) -> TorrentMetadata {
    let files: String = lengths
        .iter()
        .enumerate()
        .map(|(i, length)| {
            format!(
                "d{}i{}e{}l{}ee",
                b("length"),
                length,
                b("path"),
                b(&format!("part{}.bin", i))
            )
        })
        .collect();
    let info = format!(
        "d{}l{}e{}{}{}i16384e{}{}e",
        b("files"),
        files,
        b("name"),
        b("bundle"),
        b("piece length"),
        b("pieces"),
        b(&"p".repeat(20)),
    );
    let torrent = format!("d{}{}{}{}e", b("announce"), b(announce), b("info"), info);
    parse_torrent_metadata(torrent.as_bytes()).unwrap()
}

/// Three files of 100, 250 and 150 bytes announced to [`ANNOUNCE`].
pub fn metadata() -> TorrentMetadata {
    metadata_with(ANNOUNCE, &[100, 250, 150])
}

pub fn transaction_id(request: &[u8]) -> [u8; 4] {
    let mut id = [0u8; 4];
    id.copy_from_slice(&request[12..16]);
    id
}

pub fn connect_response(transaction_id: [u8; 4], connection_id: [u8; 8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&transaction_id);
    bytes.extend_from_slice(&connection_id);
    bytes
}

/// interval 1800, 3 leechers, 7 seeders, two peers
pub fn announce_response(transaction_id: [u8; 4]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(&transaction_id);
    bytes.extend_from_slice(&1800u32.to_be_bytes());
    bytes.extend_from_slice(&3u32.to_be_bytes());
    bytes.extend_from_slice(&7u32.to_be_bytes());
    bytes.extend_from_slice(&[192, 168, 1, 1, 0x1A, 0xE1]);
    bytes.extend_from_slice(&[10, 0, 0, 5, 0xC8, 0xD5]);
    bytes
}

pub fn expected_peers() -> Vec<PeerEndpoint> {
    vec![
        PeerEndpoint {
            ip: Ipv4Addr::new(192, 168, 1, 1),
            port: 6881,
        },
        PeerEndpoint {
            ip: Ipv4Addr::new(10, 0, 0, 5),
            port: 51413,
        },
    ]
}

#[derive(Debug)]
pub struct Sent {
    pub datagram: Vec<u8>,
    pub host: String,
    pub port: u16,
}

/// Transport that records every outgoing datagram instead of sending it.
pub struct RecordingTransport {
    sent: UnboundedSender<Sent>,
}

impl RecordingTransport {
    pub fn new() -> (Self, UnboundedReceiver<Sent>) {
        let (sent, rx) = unbounded_channel();
        (RecordingTransport { sent }, rx)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, datagram: &[u8], host: &str, port: u16) -> io::Result<()> {
        let _ = self.sent.send(Sent {
            datagram: datagram.to_vec(),
            host: host.to_string(),
            port,
        });
        Ok(())
    }
}
