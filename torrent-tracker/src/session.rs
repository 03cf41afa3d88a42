use std::time::Duration;

use tokio::time::Instant;
use torrent_parser::{
    model::TorrentMetadata,
    udp::{
        action_of, classify_response, decode_announce_response, decode_connect_response,
        encode_announce_request, encode_connect_request, AnnounceParams, AnnounceResponse,
        ConnectionId, ResponseKind, TransactionId,
    },
};
use tracing::debug;

use crate::{
    config::TrackerConfig,
    error::{TrackerError, TrackerResult},
    peer::PeerId,
};

// about 30 years; larger timeouts would overflow `Instant`
const MAX_TIMEOUT: Duration = Duration::from_secs(86400 * 365 * 30);

/// A connection id together with the moment it was handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub obtained_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingConnect,
    AwaitingAnnounce(ConnectionContext),
    Done,
    Failed,
}

/// What the driver of a session has to do next.
#[derive(Debug)]
pub enum SessionStep {
    /// Send these bytes to the tracker.
    Send(Vec<u8>),
    /// Nothing to do until the next datagram or deadline.
    Wait,
    /// The datagram did not belong to this session's outstanding request.
    Discarded(TrackerError),
    Done(AnnounceResponse),
    Failed(TrackerError),
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    transaction_id: TransactionId,
    deadline: Instant,
}

/// The connect → announce exchange with one tracker, without any I/O.
///
/// The session is fed datagrams and deadlines and answers with a
/// [`SessionStep`]. Fresh transaction ids are supplied by the caller
/// through the `mint` closures, so the caller can keep them unique across
/// all sessions sharing a socket.
pub struct TrackerSession {
    params: AnnounceParams,
    state: SessionState,
    pending: Option<PendingRequest>,
    timeouts: u32,
    base_timeout: Duration,
    max_attempts: u32,
    connection_ttl: Duration,
}

impl TrackerSession {
    pub fn new(params: AnnounceParams, config: &TrackerConfig) -> Self {
        TrackerSession {
            params,
            state: SessionState::Idle,
            pending: None,
            timeouts: 0,
            base_timeout: config.base_timeout(),
            max_attempts: config.max_attempts,
            connection_ttl: config.connection_ttl(),
        }
    }

    /// Builds a session announcing a fresh download of `metadata`.
    ///
    /// Fails before anything is sent if the content size cannot be
    /// represented.
    pub fn for_torrent(
        metadata: &TorrentMetadata,
        peer_id: PeerId,
        config: &TrackerConfig,
    ) -> TrackerResult<Self> {
        let params = AnnounceParams::new(
            metadata.info_hash(),
            peer_id.0,
            metadata.total_length()?,
            config.port,
            rand::random(),
        );
        Ok(TrackerSession::new(params, config))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn params(&self) -> &AnnounceParams {
        &self.params
    }

    pub fn pending_transaction(&self) -> Option<TransactionId> {
        self.pending.map(|pending| pending.transaction_id)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|pending| pending.deadline)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Done | SessionState::Failed)
    }

    pub fn start(&mut self, transaction_id: TransactionId, now: Instant) -> SessionStep {
        match self.state {
            SessionState::Idle => self.send_connect(transaction_id, now),
            _ => SessionStep::Wait,
        }
    }

    pub fn on_datagram(
        &mut self,
        datagram: &[u8],
        now: Instant,
        mint: impl FnOnce() -> TransactionId,
    ) -> SessionStep {
        let kind = classify_response(datagram);
        let Some(pending) = self.pending else {
            return SessionStep::Discarded(TrackerError::UnexpectedResponse(kind));
        };

        match (kind, self.state) {
            (ResponseKind::Unknown, _) => {
                SessionStep::Discarded(TrackerError::UnknownAction(action_of(datagram)))
            }
            (ResponseKind::Connect, SessionState::AwaitingConnect) => {
                let response = match decode_connect_response(datagram) {
                    Ok(response) => response,
                    Err(e) => return SessionStep::Discarded(e.into()),
                };
                if let Err(e) = check_transaction(pending, response.transaction_id) {
                    return SessionStep::Discarded(e);
                }

                debug!(connection_id = ?response.connection_id, "received connection id");
                let connection = ConnectionContext {
                    id: response.connection_id,
                    obtained_at: now,
                };
                self.send_announce(connection, mint(), now)
            }
            (ResponseKind::Announce, SessionState::AwaitingAnnounce(_)) => {
                let response = match decode_announce_response(datagram) {
                    Ok(response) => response,
                    Err(e) => return SessionStep::Discarded(e.into()),
                };
                if let Err(e) = check_transaction(pending, response.transaction_id) {
                    return SessionStep::Discarded(e);
                }

                debug!(
                    interval = response.interval,
                    leechers = response.leechers,
                    seeders = response.seeders,
                    peers = response.peers.len(),
                    "announce answered"
                );
                self.state = SessionState::Done;
                self.pending = None;
                SessionStep::Done(response)
            }
            (kind, _) => SessionStep::Discarded(TrackerError::UnexpectedResponse(kind)),
        }
    }

    pub fn on_timeout(&mut self, now: Instant, mint: impl FnOnce() -> TransactionId) -> SessionStep {
        let Some(pending) = self.pending else {
            return SessionStep::Wait;
        };
        if now < pending.deadline {
            return SessionStep::Wait;
        }

        self.timeouts += 1;
        if self.timeouts >= self.max_attempts {
            self.state = SessionState::Failed;
            self.pending = None;
            return SessionStep::Failed(TrackerError::TrackerUnreachable {
                attempts: self.timeouts,
            });
        }

        match self.state {
            SessionState::AwaitingConnect => {
                debug!(attempt = self.timeouts, "retrying connect");
                self.send_connect(mint(), now)
            }
            SessionState::AwaitingAnnounce(connection)
                if now.duration_since(connection.obtained_at) < self.connection_ttl =>
            {
                debug!(attempt = self.timeouts, "retrying announce");
                self.send_announce(connection, mint(), now)
            }
            SessionState::AwaitingAnnounce(_) => {
                debug!(attempt = self.timeouts, "connection id expired, reconnecting");
                self.send_connect(mint(), now)
            }
            SessionState::Idle | SessionState::Done | SessionState::Failed => SessionStep::Wait,
        }
    }

    fn send_connect(&mut self, transaction_id: TransactionId, now: Instant) -> SessionStep {
        self.state = SessionState::AwaitingConnect;
        self.arm(transaction_id, now);
        SessionStep::Send(encode_connect_request(transaction_id).to_vec())
    }

    fn send_announce(
        &mut self,
        connection: ConnectionContext,
        transaction_id: TransactionId,
        now: Instant,
    ) -> SessionStep {
        self.state = SessionState::AwaitingAnnounce(connection);
        self.arm(transaction_id, now);
        SessionStep::Send(encode_announce_request(connection.id, transaction_id, &self.params).to_vec())
    }

    fn arm(&mut self, transaction_id: TransactionId, now: Instant) {
        // 15s, 30s, 60s, ...
        let timeout = self
            .base_timeout
            .saturating_mul(1 << self.timeouts.min(16))
            .min(MAX_TIMEOUT);
        self.pending = Some(PendingRequest {
            transaction_id,
            deadline: now + timeout,
        });
    }
}

fn check_transaction(pending: PendingRequest, found: TransactionId) -> TrackerResult<()> {
    if pending.transaction_id == found {
        Ok(())
    } else {
        Err(TrackerError::TransactionMismatch {
            expected: pending.transaction_id,
            found,
        })
    }
}
