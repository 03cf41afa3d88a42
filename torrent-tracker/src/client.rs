use std::{collections::HashMap, future::pending, sync::Arc};

use parking_lot::Mutex;
use tokio::{
    select, spawn,
    sync::mpsc::{unbounded_channel, UnboundedSender},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use torrent_parser::{
    model::TorrentMetadata,
    udp::{
        action_of, classify_response, transaction_id_of, AnnounceResponse, PeerEndpoint,
        ResponseKind, TransactionId,
    },
};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::{
    config::TrackerConfig,
    error::TrackerResult,
    peer::{PeerId, PeerIdentity},
    session::{SessionStep, TrackerSession},
    tracker::TrackerEndpoint,
    transport::{Transport, UdpTransport},
};

pub type SessionId = Uuid;

struct PendingEntry {
    session: SessionId,
    sender: UnboundedSender<Vec<u8>>,
}

type PendingTable = Mutex<HashMap<TransactionId, PendingEntry>>;

/// Runs tracker sessions over one shared datagram channel.
///
/// Every outstanding request is registered in a transaction table; inbound
/// datagrams go through [`TrackerClient::dispatch`], which routes them to
/// the session owning their transaction id and drops everything else.
pub struct TrackerClient {
    transport: Arc<dyn Transport>,
    identity: Arc<PeerIdentity>,
    config: TrackerConfig,
    pending: PendingTable,
}

impl TrackerClient {
    pub fn new(transport: Arc<dyn Transport>, config: TrackerConfig) -> Self {
        TrackerClient::with_identity(transport, Arc::new(PeerIdentity::default()), config)
    }

    pub fn with_identity(
        transport: Arc<dyn Transport>,
        identity: Arc<PeerIdentity>,
        config: TrackerConfig,
    ) -> Self {
        TrackerClient {
            transport,
            identity,
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Binds a UDP socket on `config.bind_addr` and starts feeding it into a
    /// new client. Aborting the returned handle stops the receiver.
    pub async fn bind_udp(config: TrackerConfig) -> TrackerResult<(Arc<Self>, JoinHandle<()>)> {
        let transport = Arc::new(UdpTransport::bind(&config.bind_addr).await?);
        let local_addr = transport.local_addr()?;
        info!(%local_addr, "tracker socket bound");
        let client = Arc::new(TrackerClient::new(transport.clone(), config));
        let receiver = transport.spawn_receiver(Arc::clone(&client));
        Ok((client, receiver))
    }

    pub fn peer_id(&self) -> PeerId {
        self.identity.current()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn pending_transactions(&self) -> usize {
        self.pending.lock().len()
    }

    /// Routes one inbound datagram to the session waiting for it.
    pub fn dispatch(&self, datagram: &[u8]) {
        if classify_response(datagram) == ResponseKind::Unknown {
            debug!(
                action = ?action_of(datagram),
                len = datagram.len(),
                "dropping datagram with unknown action"
            );
            return;
        }
        let Some(transaction_id) = transaction_id_of(datagram) else {
            debug!(len = datagram.len(), "dropping datagram too short to correlate");
            return;
        };

        let mut pending = self.pending.lock();
        let delivered = pending.get(&transaction_id).map(|entry| {
            trace!(session = %entry.session, %transaction_id, "routing datagram");
            entry.sender.send(datagram.to_vec()).is_ok()
        });
        match delivered {
            Some(true) => {}
            // the session went away without unregistering
            Some(false) => {
                pending.remove(&transaction_id);
            }
            None => trace!(%transaction_id, "dropping datagram for unknown transaction"),
        }
    }

    pub async fn announce(&self, metadata: &TorrentMetadata) -> TrackerResult<AnnounceResponse> {
        self.announce_as(Uuid::new_v4(), metadata).await
    }

    pub async fn peers(&self, metadata: &TorrentMetadata) -> TrackerResult<Vec<PeerEndpoint>> {
        Ok(self.announce(metadata).await?.peers)
    }

    /// Looks up peers in the background and hands the outcome to `on_peers`
    /// exactly once, unless the session is cancelled first.
    pub fn get_peers<F>(self: &Arc<Self>, metadata: TorrentMetadata, on_peers: F) -> SessionHandle
    where
        F: FnOnce(TrackerResult<Vec<PeerEndpoint>>) + Send + 'static,
    {
        let client = Arc::clone(self);
        let id = Uuid::new_v4();
        let task = spawn(async move {
            let result = client
                .announce_as(id, &metadata)
                .await
                .map(|response| response.peers);
            on_peers(result);
        });
        SessionHandle { id, task }
    }

    async fn announce_as(
        &self,
        id: SessionId,
        metadata: &TorrentMetadata,
    ) -> TrackerResult<AnnounceResponse> {
        let endpoint = TrackerEndpoint::from_announce(&metadata.announce)?;
        let session = TrackerSession::for_torrent(metadata, self.identity.current(), &self.config)?;
        self.run_session(id, endpoint, session).await
    }

    async fn run_session(
        &self,
        id: SessionId,
        endpoint: TrackerEndpoint,
        mut session: TrackerSession,
    ) -> TrackerResult<AnnounceResponse> {
        let (sender, mut inbox) = unbounded_channel();
        let mut registration = Registration {
            table: &self.pending,
            session: id,
            sender,
            current: None,
        };

        debug!(session = %id, tracker = %endpoint, "starting tracker session");
        let mut step = session.start(registration.mint(), Instant::now());
        loop {
            match step {
                SessionStep::Send(datagram) => self.send(id, &endpoint, &datagram).await,
                SessionStep::Wait => {}
                SessionStep::Discarded(reason) => {
                    trace!(session = %id, %reason, "discarded datagram");
                }
                SessionStep::Done(response) => {
                    info!(
                        session = %id,
                        tracker = %endpoint,
                        peers = response.peers.len(),
                        "received peers"
                    );
                    return Ok(response);
                }
                SessionStep::Failed(e) => {
                    warn!(session = %id, tracker = %endpoint, error = %e, "tracker session failed");
                    return Err(e);
                }
            }

            let deadline = session.deadline();
            step = select! {
                datagram = inbox.recv() => match datagram {
                    Some(datagram) => {
                        session.on_datagram(&datagram, Instant::now(), || registration.mint())
                    }
                    // unreachable while `registration` holds a sender
                    None => SessionStep::Wait,
                },
                _ = wait_until(deadline) => {
                    session.on_timeout(Instant::now(), || registration.mint())
                }
            };
        }
    }

    async fn send(&self, id: SessionId, endpoint: &TrackerEndpoint, datagram: &[u8]) {
        trace!(session = %id, tracker = %endpoint, len = datagram.len(), "sending request");
        if let Err(e) = self
            .transport
            .send(datagram, &endpoint.host, endpoint.port)
            .await
        {
            // the retry timer resends
            warn!(session = %id, tracker = %endpoint, error = %e, "send failed");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// A session's slot in the transaction table. Holds at most one
/// transaction id at a time and frees it when replaced or dropped.
struct Registration<'a> {
    table: &'a PendingTable,
    session: SessionId,
    sender: UnboundedSender<Vec<u8>>,
    current: Option<TransactionId>,
}

impl Registration<'_> {
    fn mint(&mut self) -> TransactionId {
        let mut table = self.table.lock();
        let previous = self.current.take();
        if let Some(previous) = previous {
            table.remove(&previous);
        }
        let transaction_id = loop {
            let candidate = TransactionId(rand::random());
            if Some(candidate) != previous && !table.contains_key(&candidate) {
                break candidate;
            }
        };
        table.insert(
            transaction_id,
            PendingEntry {
                session: self.session,
                sender: self.sender.clone(),
            },
        );
        self.current = Some(transaction_id);
        transaction_id
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Some(current) = self.current.take() {
            self.table.lock().remove(&current);
        }
    }
}

/// Handle to a session started with [`TrackerClient::get_peers`].
///
/// Dropping the handle leaves the session running; use
/// [`SessionHandle::cancel`] to abandon it.
pub struct SessionHandle {
    id: SessionId,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Stops the session: no more requests are sent and the callback is
    /// not invoked.
    pub fn cancel(&self) {
        debug!(session = %self.id, "cancelling tracker session");
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the session to end. Returns `false` if it was cancelled.
    pub async fn wait(self) -> bool {
        self.task.await.is_ok()
    }
}
