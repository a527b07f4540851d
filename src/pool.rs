// src/pool.rs

//! Named, priority-ordered admission gates.
//!
//! A [`ResourcePool`] is a counting semaphore whose waiters are admitted by
//! descending task priority, FIFO among equal priorities. The request is
//! registered synchronously in [`ResourcePool::acquire`]; only the wait is
//! async. That lets the scheduler fix the admission order simply by the order
//! in which it dispatches tasks.
//!
//! Permits are released when dropped, on every exit path. A permit handed to
//! a waiter that went away in the meantime is passed on to the next waiter.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::config::model::PoolConfig;
use crate::errors::{Result, TrigdagError};

#[derive(Clone)]
pub struct ResourcePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    name: String,
    capacity: usize,
    state: Mutex<PoolState>,
}

struct PoolState {
    available: usize,
    waiters: BinaryHeap<Waiter>,
    next_seq: u64,
}

struct Waiter {
    priority: i32,
    seq: u64,
    tx: oneshot::Sender<PoolPermit>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    // Max-heap: highest priority first, then earliest arrival.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("available", &self.available())
            .field("waiting", &self.waiting())
            .finish()
    }
}

impl ResourcePool {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name: name.into(),
                capacity,
                state: Mutex::new(PoolState {
                    available: capacity,
                    waiters: BinaryHeap::new(),
                    next_seq: 0,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn available(&self) -> usize {
        self.inner.lock().available
    }

    pub fn waiting(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Register a request for one slot. The returned [`Admission`] resolves
    /// once the slot is granted.
    pub fn acquire(&self, priority: i32) -> Admission {
        let mut state = self.inner.lock();

        if state.available > 0 && state.waiters.is_empty() {
            state.available -= 1;
            trace!(pool = %self.inner.name, priority, "admitted immediately");
            return Admission {
                pool: self.inner.name.clone(),
                state: AdmissionState::Ready(PoolPermit {
                    pool: Some(Arc::clone(&self.inner)),
                }),
            };
        }

        let (tx, rx) = oneshot::channel();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.waiters.push(Waiter { priority, seq, tx });
        debug!(
            pool = %self.inner.name,
            priority,
            waiting = state.waiters.len(),
            "pool full; queued for admission"
        );

        Admission {
            pool: self.inner.name.clone(),
            state: AdmissionState::Waiting(rx),
        }
    }
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(self: &Arc<Self>) {
        let mut state = self.lock();
        while let Some(waiter) = state.waiters.pop() {
            let permit = PoolPermit {
                pool: Some(Arc::clone(self)),
            };
            match waiter.tx.send(permit) {
                Ok(()) => {
                    trace!(pool = %self.name, priority = waiter.priority, "slot handed to waiter");
                    return;
                }
                Err(mut unclaimed) => {
                    // Waiter gave up; disarm so dropping it does not re-enter.
                    unclaimed.pool = None;
                }
            }
        }
        state.available += 1;
    }
}

/// Pending or granted admission to a pool.
pub struct Admission {
    pool: String,
    state: AdmissionState,
}

enum AdmissionState {
    Ready(PoolPermit),
    Waiting(oneshot::Receiver<PoolPermit>),
}

impl Admission {
    pub fn is_ready(&self) -> bool {
        matches!(self.state, AdmissionState::Ready(_))
    }

    /// Wait for the slot. Dropping this future before it resolves gives up
    /// the place in the queue.
    pub async fn granted(self) -> Result<PoolPermit> {
        match self.state {
            AdmissionState::Ready(permit) => Ok(permit),
            AdmissionState::Waiting(rx) => rx
                .await
                .map_err(|_| TrigdagError::Cancelled(format!("admission to pool '{}'", self.pool))),
        }
    }
}

/// One occupied slot. Released on drop.
pub struct PoolPermit {
    pool: Option<Arc<PoolInner>>,
}

impl fmt::Debug for PoolPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolPermit")
            .field("pool", &self.pool.as_ref().map(|p| p.name.as_str()))
            .finish()
    }
}

impl Drop for PoolPermit {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release();
        }
    }
}

/// All pools known to one execution, by name.
#[derive(Debug, Clone, Default)]
pub struct ResourcePools {
    pools: HashMap<String, ResourcePool>,
}

impl ResourcePools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config<'a>(pools: impl IntoIterator<Item = (&'a String, &'a PoolConfig)>) -> Self {
        let mut out = Self::new();
        for (name, cfg) in pools {
            out.insert(ResourcePool::new(name.clone(), cfg.capacity));
        }
        out
    }

    pub fn with_pool(mut self, name: &str, capacity: usize) -> Self {
        self.insert(ResourcePool::new(name, capacity));
        self
    }

    pub fn insert(&mut self, pool: ResourcePool) {
        self.pools.insert(pool.name().to_string(), pool);
    }

    pub fn get(&self, name: &str) -> Option<&ResourcePool> {
        self.pools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    /// Capacity of every pool, by name.
    pub fn capacities(&self) -> HashMap<String, usize> {
        self.pools
            .iter()
            .map(|(name, pool)| (name.clone(), pool.capacity()))
            .collect()
    }
}
