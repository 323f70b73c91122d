//! Flow-controlled output buffer.
//!
//! Producers `put` signed blocks; consumers pull them with `handle_request`.
//! A request that finds nothing buffered parks on a oneshot channel until a
//! matching put hands the block over or its timeout expires. Matching always
//! runs under the state lock, so a put and a request can never miss each other.

use crate::config::{BufferConfig, BufferMode, OverflowPolicy};
use crate::matcher::NameMatcher;
use cnp_core::{Block, Error, Interest, Name, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Lifecycle of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferPhase {
    Open,
    /// Refusing puts, still serving requests.
    Draining,
    Closed,
}

/// Outcome of a drain wait.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Blocks never delivered to any reader.
    pub unclaimed: usize,
    pub timed_out: bool,
    pub waited: Duration,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.unclaimed == 0 && !self.timed_out
    }
}

#[derive(Debug)]
struct BufferEntry {
    block: Block,
    order: u64,
    deliveries: u32,
}

enum Delivery {
    Once(oneshot::Sender<Block>),
    Standing(mpsc::Sender<Block>),
}

struct PendingRequest {
    interest: Interest,
    delivery: Delivery,
    max_results: Option<usize>,
    delivered: usize,
    registered_at: Instant,
}

struct State {
    phase: BufferPhase,
    capacity: usize,
    entries: BTreeMap<Name, BufferEntry>,
    /// Keyed by registration id, so iteration order is oldest first.
    pending: BTreeMap<u64, PendingRequest>,
    /// Registered prefixes with the number of holders of each.
    namespaces: BTreeMap<Name, usize>,
    next_id: u64,
    next_order: u64,
}

impl State {
    fn unclaimed(&self) -> usize {
        self.entries.values().filter(|e| e.deliveries == 0).count()
    }

    fn sweep_delivered(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.deliveries == 0);
        before - self.entries.len()
    }

    fn in_namespace(&self, name: &Name) -> bool {
        self.namespaces.is_empty()
            || (0..=name.len()).any(|depth| self.namespaces.contains_key(&name.prefix(depth)))
    }
}

struct Inner {
    config: BufferConfig,
    state: Mutex<State>,
    matcher: NameMatcher<u64>,
    /// Signalled whenever room may have appeared or the phase changed.
    space: Notify,
    /// Signalled whenever an entry is delivered or removed.
    claimed: Notify,
}

impl Inner {
    fn best_effort(&self) -> bool {
        self.config.mode == BufferMode::BestEffort
    }

    fn register(
        &self,
        state: &mut State,
        interest: Interest,
        delivery: Delivery,
        max_results: Option<usize>,
    ) -> u64 {
        let id = state.next_id;
        state.next_id += 1;
        self.matcher.register(&interest.name, id);
        state.pending.insert(
            id,
            PendingRequest {
                interest,
                delivery,
                max_results,
                delivered: 0,
                registered_at: Instant::now(),
            },
        );
        id
    }

    fn forget(&self, state: &mut State, id: u64) -> Option<PendingRequest> {
        let request = state.pending.remove(&id)?;
        self.matcher.unregister(&request.interest.name, &id);
        Some(request)
    }

    /// Offer a new block to parked requests and standing filters, returning
    /// how many of them took it.
    fn dispatch(&self, state: &mut State, block: &Block) -> u32 {
        let mut ids = self.matcher.matches(block.name());
        ids.sort_unstable();

        let mut delivered = 0;
        let mut satisfied = false;
        for id in ids {
            let Some(request) = state.pending.get_mut(&id) else {
                continue;
            };
            if !request.interest.matches(block.name()) {
                continue;
            }

            if matches!(request.delivery, Delivery::Once(_)) {
                if satisfied && self.best_effort() {
                    continue;
                }
                let Some(request) = self.forget(state, id) else {
                    continue;
                };
                let waited = request.registered_at.elapsed();
                if let Delivery::Once(tx) = request.delivery {
                    // A dropped receiver means the reader gave up; try the next one.
                    if tx.send(block.clone()).is_ok() {
                        trace!(request = id, name = %block.name(), ?waited, "satisfied parked request");
                        delivered += 1;
                        satisfied = true;
                    }
                }
                continue;
            }

            let Delivery::Standing(tx) = &request.delivery else {
                continue;
            };
            let finished = match tx.try_send(block.clone()) {
                Ok(()) => {
                    delivered += 1;
                    request.delivered += 1;
                    request
                        .max_results
                        .is_some_and(|max| request.delivered >= max)
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(filter = id, name = %block.name(), "filter queue full, dropping block");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => true,
            };
            if finished {
                self.forget(state, id);
            }
        }
        delivered
    }

    /// Insert `block` if there is room. `Ok(false)` means the buffer is full.
    fn try_insert(&self, state: &mut State, block: &Block) -> Result<bool> {
        if state.phase != BufferPhase::Open {
            return Err(Error::ClosedBuffer);
        }
        if !state.in_namespace(block.name()) {
            return Err(Error::invalid(format!(
                "{} is outside every registered namespace",
                block.name()
            )));
        }

        let replacing = state.entries.contains_key(block.name());
        if !replacing && state.entries.len() >= state.capacity {
            if self.best_effort() {
                let swept = state.sweep_delivered();
                if swept > 0 {
                    trace!(swept, "swept delivered blocks");
                }
            }
            if state.entries.len() >= state.capacity {
                return Ok(false);
            }
        }

        let order = state.next_order;
        state.next_order += 1;
        let deliveries = self.dispatch(state, block);
        state.entries.insert(
            block.name().clone(),
            BufferEntry {
                block: block.clone(),
                order,
                deliveries,
            },
        );
        if deliveries > 0 {
            self.claimed.notify_waiters();
        }
        Ok(true)
    }

    /// Pick a buffered block for `interest`: the lowest segment if any
    /// candidate is a segment, otherwise the oldest insertion.
    fn take_buffered(&self, state: &mut State, interest: &Interest) -> Option<Block> {
        let best_effort = self.best_effort();
        let mut segment: Option<&Name> = None;
        let mut oldest: Option<(&Name, u64)> = None;

        let candidates = state
            .entries
            .range(interest.name.clone()..)
            .take_while(|(name, _)| interest.name.is_prefix_of(name))
            .filter(|(name, entry)| interest.matches(name) && !(best_effort && entry.deliveries > 0));
        for (name, entry) in candidates {
            if name.is_segment() {
                segment = Some(name);
                break;
            }
            if oldest.map_or(true, |(_, order)| entry.order < order) {
                oldest = Some((name, entry.order));
            }
        }

        let chosen = segment.or(oldest.map(|(name, _)| name))?.clone();
        let entry = state.entries.get_mut(&chosen)?;
        entry.deliveries += 1;
        Some(entry.block.clone())
    }
}

/// Removes a parked request when the waiting future finishes or is dropped.
struct PendingGuard<'a> {
    inner: &'a Inner,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        self.inner.forget(&mut state, self.id);
    }
}

/// Bounded, name-keyed buffer between a producer and its readers.
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone)]
pub struct FlowControlledBuffer {
    inner: Arc<Inner>,
}

impl FlowControlledBuffer {
    pub fn new(config: BufferConfig) -> Self {
        let state = State {
            phase: BufferPhase::Open,
            capacity: config.capacity,
            entries: BTreeMap::new(),
            pending: BTreeMap::new(),
            namespaces: BTreeMap::new(),
            next_id: 0,
            next_order: 0,
        };
        FlowControlledBuffer {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
                matcher: NameMatcher::new(),
                space: Notify::new(),
                claimed: Notify::new(),
            }),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(BufferConfig::builder().capacity(capacity).build())
    }

    pub fn config(&self) -> &BufferConfig {
        &self.inner.config
    }

    /// Buffer a block, waking any parked request it satisfies.
    ///
    /// A block whose name is already buffered replaces the old one without
    /// taking another slot. When the buffer is full the put waits for room
    /// (up to the put timeout) or fails at once, depending on the overflow
    /// policy; either way a full buffer ends in `CapacityExceeded`.
    pub async fn put(&self, block: Block) -> Result<Block> {
        let inner = &*self.inner;
        let deadline = Instant::now() + inner.config.put_timeout;

        loop {
            // Registered before the state check so a wake-up in between is kept.
            let space = inner.space.notified();
            let (capacity, occupancy) = {
                let mut state = inner.state.lock();
                if inner.try_insert(&mut state, &block)? {
                    trace!(name = %block.name(), occupancy = state.entries.len(), "buffered block");
                    return Ok(block);
                }
                (state.capacity, state.entries.len())
            };

            if inner.config.overflow == OverflowPolicy::Fail {
                return Err(Error::CapacityExceeded {
                    capacity,
                    occupancy,
                });
            }
            debug!(name = %block.name(), capacity, occupancy, "buffer full, waiting for space");

            if tokio::time::timeout_at(deadline, space).await.is_err() {
                let state = inner.state.lock();
                return Err(Error::CapacityExceeded {
                    capacity: state.capacity,
                    occupancy: state.entries.len(),
                });
            }
        }
    }

    /// Return a block matching `interest`, waiting up to `timeout` for one to
    /// be put. `Ok(None)` means nothing arrived in time.
    pub async fn handle_request(
        &self,
        interest: impl Into<Interest>,
        timeout: Duration,
    ) -> Result<Option<Block>> {
        let interest = interest.into();
        let inner = &*self.inner;

        let (id, mut rx) = {
            let mut state = inner.state.lock();
            if state.phase == BufferPhase::Closed {
                return Err(Error::ClosedBuffer);
            }
            if let Some(block) = inner.take_buffered(&mut state, &interest) {
                drop(state);
                trace!(name = %block.name(), "served buffered block");
                inner.claimed.notify_waiters();
                if inner.best_effort() {
                    inner.space.notify_waiters();
                }
                return Ok(Some(block));
            }
            let (tx, rx) = oneshot::channel();
            let id = inner.register(&mut state, interest, Delivery::Once(tx), Some(1));
            (id, rx)
        };

        let guard = PendingGuard { inner, id };
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(block)) => Ok(Some(block)),
            Ok(Err(_)) => Err(Error::ClosedBuffer),
            Err(_) => {
                drop(guard);
                // A put may have handed the block over just as the timer fired.
                Ok(rx.try_recv().ok())
            }
        }
    }

    /// Register a standing filter that receives a copy of every matching
    /// block put from now on. Dropping the subscription removes the filter.
    pub fn subscribe(
        &self,
        interest: impl Into<Interest>,
        max_results: Option<usize>,
    ) -> Result<Subscription> {
        let inner = &*self.inner;
        let (tx, rx) = mpsc::channel(inner.config.filter_queue.max(1));
        let mut state = inner.state.lock();
        if state.phase == BufferPhase::Closed {
            return Err(Error::ClosedBuffer);
        }
        let id = inner.register(&mut state, interest.into(), Delivery::Standing(tx), max_results);
        Ok(Subscription {
            id,
            rx,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Change the capacity. Lowering it below the current occupancy evicts
    /// nothing; puts simply block until readers catch up.
    pub fn set_capacity(&self, capacity: usize) {
        self.inner.state.lock().capacity = capacity;
        self.inner.space.notify_waiters();
    }

    pub fn capacity(&self) -> usize {
        self.inner.state.lock().capacity
    }

    /// Restrict puts to names under `prefix` (and any other registered
    /// namespace).
    ///
    /// Registrations are counted: a prefix added twice stays registered
    /// until it has been removed twice.
    pub fn add_namespace(&self, prefix: Name) {
        let mut state = self.inner.state.lock();
        let holders = state.namespaces.entry(prefix).or_insert(0);
        *holders += 1;
        if *holders == 1 {
            debug!(namespaces = state.namespaces.len(), "registered namespace");
        }
    }

    /// Drop one registration of `prefix`. Returns false if it was not
    /// registered.
    pub fn remove_namespace(&self, prefix: &Name) -> bool {
        let mut state = self.inner.state.lock();
        let Some(holders) = state.namespaces.get_mut(prefix) else {
            return false;
        };
        *holders -= 1;
        if *holders == 0 {
            state.namespaces.remove(prefix);
            debug!(namespace = %prefix, "released namespace");
        }
        true
    }

    pub fn namespaces(&self) -> Vec<Name> {
        self.inner.state.lock().namespaces.keys().cloned().collect()
    }

    /// Wait until every buffered block has been delivered at least once, or
    /// `timeout` passes.
    pub async fn wait_for_drain(&self, timeout: Duration) -> DrainReport {
        let inner = &*self.inner;
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            let claimed = inner.claimed.notified();
            let unclaimed = inner.state.lock().unclaimed();
            if unclaimed == 0 {
                return DrainReport {
                    unclaimed: 0,
                    timed_out: false,
                    waited: started.elapsed(),
                };
            }
            if tokio::time::timeout_at(deadline, claimed).await.is_err() {
                let unclaimed = inner.state.lock().unclaimed();
                return DrainReport {
                    unclaimed,
                    timed_out: unclaimed > 0,
                    waited: started.elapsed(),
                };
            }
        }
    }

    /// Stop accepting puts, drain, and close.
    ///
    /// Best-effort buffers wait up to the drain timeout for readers to claim
    /// what is left; an expired wait is logged and reported, and is only an
    /// error when `strict_drain` is set. Persistent buffers close at once.
    /// Parked requests are released with `ClosedBuffer`.
    pub async fn close(&self) -> Result<DrainReport> {
        let inner = &*self.inner;
        {
            let mut state = inner.state.lock();
            if state.phase == BufferPhase::Closed {
                return Ok(DrainReport::default());
            }
            state.phase = BufferPhase::Draining;
        }
        inner.space.notify_waiters();

        let report = match inner.config.mode {
            BufferMode::BestEffort => self.wait_for_drain(inner.config.drain_timeout).await,
            BufferMode::Persistent => {
                let unclaimed = inner.state.lock().unclaimed();
                DrainReport {
                    unclaimed,
                    ..DrainReport::default()
                }
            }
        };

        {
            let mut state = inner.state.lock();
            state.phase = BufferPhase::Closed;
            let released = state.pending.len();
            state.pending.clear();
            state.entries.clear();
            inner.matcher.clear();
            debug!(released, unclaimed = report.unclaimed, "buffer closed");
        }
        inner.space.notify_waiters();
        inner.claimed.notify_waiters();

        if report.timed_out {
            warn!(
                unclaimed = report.unclaimed,
                timeout = ?inner.config.drain_timeout,
                "drain timed out with unclaimed blocks"
            );
            if inner.config.strict_drain {
                return Err(Error::Timeout(inner.config.drain_timeout));
            }
        }
        Ok(report)
    }

    pub fn phase(&self) -> BufferPhase {
        self.inner.state.lock().phase
    }

    /// Drop every buffered block. Parked requests stay parked.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut state = self.inner.state.lock();
            let removed = state.entries.len();
            state.entries.clear();
            removed
        };
        self.inner.space.notify_waiters();
        self.inner.claimed.notify_waiters();
        removed
    }

    pub fn remove(&self, name: &Name) -> Option<Block> {
        let removed = self.inner.state.lock().entries.remove(name)?;
        self.inner.space.notify_waiters();
        self.inner.claimed.notify_waiters();
        Some(removed.block)
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.inner.state.lock().entries.contains_key(name)
    }

    /// Look at a buffered block without counting it as delivered.
    pub fn peek(&self, name: &Name) -> Option<Block> {
        self.inner
            .state
            .lock()
            .entries
            .get(name)
            .map(|entry| entry.block.clone())
    }

    /// Number of buffered blocks.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().entries.is_empty()
    }

    /// Buffered blocks not yet delivered to anyone.
    pub fn unclaimed(&self) -> usize {
        self.inner.state.lock().unclaimed()
    }

    /// Parked requests plus standing filters.
    pub fn pending_requests(&self) -> usize {
        self.inner.state.lock().pending.len()
    }
}

impl Default for FlowControlledBuffer {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}

impl fmt::Debug for FlowControlledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("FlowControlledBuffer")
            .field("mode", &self.inner.config.mode)
            .field("phase", &state.phase)
            .field("capacity", &state.capacity)
            .field("len", &state.entries.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

/// A standing filter registered with [`FlowControlledBuffer::subscribe`].
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Block>,
    inner: Arc<Inner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next matching block. `None` once the filter is exhausted or the
    /// buffer is closed.
    pub async fn recv(&mut self) -> Option<Block> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Block> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        self.inner.forget(&mut state, self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
