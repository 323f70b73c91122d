//! Transport seam: inbound interests in, signed blocks out.

use async_trait::async_trait;
use cnp_core::{Block, Interest};
use cnp_flow::FlowControlledBuffer;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Identifies the endpoint an interest came from, so the answer goes back there.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceId(pub String);

impl FaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for FaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Face not found: {0}")]
    FaceNotFound(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Interest stream already taken")]
    AlreadySubscribed,

    #[error("Disconnected")]
    Disconnected,

    #[error(transparent)]
    Publish(#[from] cnp_core::Error),
}

/// Something that delivers interests and carries blocks back.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send a block to the face that asked for it.
    async fn send(&self, face: &FaceId, block: Block) -> Result<(), TransportError>;

    /// Take the inbound interest stream. Only one subscriber is allowed.
    fn subscribe(&self) -> Result<mpsc::Receiver<(FaceId, Interest)>, TransportError>;
}

type SharedInterestReceiver = Arc<RwLock<Option<mpsc::Receiver<(FaceId, Interest)>>>>;
type SharedFaces = Arc<RwLock<HashMap<FaceId, mpsc::Sender<Block>>>>;

/// In-memory transport for tests and simulations.
pub struct MemoryTransport {
    interest_tx: mpsc::Sender<(FaceId, Interest)>,
    interest_rx: SharedInterestReceiver,
    faces: SharedFaces,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            interest_tx: tx,
            interest_rx: Arc::new(RwLock::new(Some(rx))),
            faces: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attach a consumer endpoint.
    pub fn connect(&self, id: FaceId) -> MemoryFace {
        let (tx, rx) = mpsc::channel(100);
        self.faces.write().insert(id.clone(), tx);
        MemoryFace {
            id,
            interests: self.interest_tx.clone(),
            blocks: rx,
        }
    }

    pub fn disconnect(&self, id: &FaceId) -> bool {
        self.faces.write().remove(id).is_some()
    }

    pub fn faces(&self) -> Vec<FaceId> {
        let mut ids: Vec<_> = self.faces.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, face: &FaceId, block: Block) -> Result<(), TransportError> {
        let tx = {
            let faces = self.faces.read();
            faces.get(face).cloned()
        };

        match tx {
            Some(tx) => tx
                .send(block)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string())),
            None => Err(TransportError::FaceNotFound(face.to_string())),
        }
    }

    fn subscribe(&self) -> Result<mpsc::Receiver<(FaceId, Interest)>, TransportError> {
        self.interest_rx
            .write()
            .take()
            .ok_or(TransportError::AlreadySubscribed)
    }
}

/// Consumer end of a [`MemoryTransport`].
pub struct MemoryFace {
    id: FaceId,
    interests: mpsc::Sender<(FaceId, Interest)>,
    blocks: mpsc::Receiver<Block>,
}

impl MemoryFace {
    pub fn id(&self) -> &FaceId {
        &self.id
    }

    pub async fn express(&self, interest: impl Into<Interest>) -> Result<(), TransportError> {
        self.interests
            .send((self.id.clone(), interest.into()))
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    /// Next block sent to this face.
    pub async fn recv(&mut self) -> Option<Block> {
        self.blocks.recv().await
    }

    /// Express an interest and wait up to `timeout` for a block.
    pub async fn fetch(
        &mut self,
        interest: impl Into<Interest>,
        timeout: Duration,
    ) -> Result<Option<Block>, TransportError> {
        self.express(interest).await?;
        Ok(tokio::time::timeout(timeout, self.recv())
            .await
            .ok()
            .flatten())
    }
}

/// Counters kept by a running [`InterestServer`].
#[derive(Debug, Default)]
pub struct ServerStats {
    served: AtomicU64,
    expired: AtomicU64,
    failed: AtomicU64,
}

impl ServerStats {
    /// Interests answered with a block.
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Interests that timed out unanswered.
    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    /// Interests that hit a buffer or send error.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Answers interests from a transport out of a buffer.
pub struct InterestServer<T: Transport> {
    transport: Arc<T>,
    buffer: FlowControlledBuffer,
    request_timeout: Duration,
}

impl<T: Transport> InterestServer<T> {
    pub fn new(transport: Arc<T>, buffer: FlowControlledBuffer, request_timeout: Duration) -> Self {
        Self {
            transport,
            buffer,
            request_timeout,
        }
    }

    /// Start serving in a background task.
    ///
    /// Interests are handled concurrently, so one that waits for content does
    /// not hold up the others. The task ends when the transport's interest
    /// stream closes (after finishing in-flight interests) or on shutdown.
    pub fn spawn(self) -> Result<ServerHandle, TransportError> {
        let mut inbound = self.transport.subscribe()?;
        let stats = Arc::new(ServerStats::default());
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task_stats = Arc::clone(&stats);
        let task = tokio::spawn(async move {
            let mut in_flight = FuturesUnordered::new();
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!(in_flight = in_flight.len(), "interest server shutting down");
                        return;
                    }
                    next = inbound.recv() => match next {
                        Some((face, interest)) => in_flight.push(serve(
                            Arc::clone(&self.transport),
                            self.buffer.clone(),
                            face,
                            interest,
                            self.request_timeout,
                            Arc::clone(&task_stats),
                        )),
                        None => break,
                    },
                    Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
                }
            }
            while in_flight.next().await.is_some() {}
            debug!("interest stream closed");
        });

        Ok(ServerHandle {
            task,
            shutdown: Some(shutdown_tx),
            stats,
        })
    }
}

async fn serve<T: Transport>(
    transport: Arc<T>,
    buffer: FlowControlledBuffer,
    face: FaceId,
    interest: Interest,
    timeout: Duration,
    stats: Arc<ServerStats>,
) {
    match buffer.handle_request(interest.clone(), timeout).await {
        Ok(Some(block)) => {
            let name = block.name().clone();
            match transport.send(&face, block).await {
                Ok(()) => {
                    trace!(face = %face, name = %name, "answered interest");
                    stats.served.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(face = %face, name = %name, error = %e, "failed to send block");
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(None) => {
            trace!(face = %face, interest = %interest.name, "interest expired");
            stats.expired.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            debug!(face = %face, interest = %interest.name, error = %e, "interest not served");
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Handle to a running [`InterestServer`]. Dropping it stops the server.
pub struct ServerHandle {
    task: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
    stats: Arc<ServerStats>,
}

impl ServerHandle {
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop serving, dropping interests still waiting for content.
    pub async fn shutdown(mut self) -> Arc<ServerStats> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "interest server task failed");
        }
        Arc::clone(&self.stats)
    }
}
