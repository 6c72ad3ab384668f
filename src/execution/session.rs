//! Query-owned session state
//!
//! Holds every dataset's remote session, the active GROUP BY level and the
//! worker permits. Per-dataset work runs on the blocking pool, at most
//! `max_parallelism` units at a time, and each fan-out is a full barrier.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, TryLockError};

use chrono::FixedOffset;
use futures_util::future::join_all;
use tokio::sync::Semaphore;

use crate::groupkeys::{GroupKeyChain, LevelId};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, TreeTimer};
use crate::session::{ImhotepSession, SessionError, SessionInfo};

use super::errors::{ExecutionError, ExecutionResult};

type SharedSession = Arc<Mutex<Box<dyn ImhotepSession>>>;

struct DatasetSession {
    name: String,
    info: SessionInfo,
    handle: SharedSession,
}

/// Limits applied while executing one query
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// None disables the check
    pub group_limit: Option<u32>,
    pub max_parallelism: usize,
    pub timezone: FixedOffset,
}

/// Remote sessions plus group state for one query
pub struct Session {
    datasets: Vec<DatasetSession>,
    chain: GroupKeyChain,
    level: LevelId,
    options: SessionOptions,
    permits: Arc<Semaphore>,
    timer: TreeTimer,
    metrics: Arc<MetricsRegistry>,
    closed: bool,
}

impl Session {
    /// Take ownership of opened sessions, in query dataset order
    pub fn new(
        sessions: Vec<(String, Box<dyn ImhotepSession>)>,
        options: SessionOptions,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let datasets = sessions
            .into_iter()
            .map(|(name, session)| DatasetSession {
                info: session.info(),
                name,
                handle: Arc::new(Mutex::new(session)),
            })
            .collect();
        let chain = GroupKeyChain::new();
        let level = chain.root();
        let permits = Arc::new(Semaphore::new(options.max_parallelism.max(1)));
        Self {
            datasets,
            chain,
            level,
            options,
            permits,
            timer: TreeTimer::new(),
            metrics,
            closed: false,
        }
    }

    pub fn dataset_names(&self) -> Vec<String> {
        self.datasets.iter().map(|d| d.name.clone()).collect()
    }

    pub fn infos(&self) -> BTreeMap<String, SessionInfo> {
        self.datasets
            .iter()
            .map(|d| (d.name.clone(), d.info.clone()))
            .collect()
    }

    pub fn info(&self, dataset: &str) -> Option<&SessionInfo> {
        self.datasets
            .iter()
            .find(|d| d.name == dataset)
            .map(|d| &d.info)
    }

    pub fn chain(&self) -> &GroupKeyChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut GroupKeyChain {
        &mut self.chain
    }

    pub fn level(&self) -> LevelId {
        self.level
    }

    /// Groups at the active level
    pub fn num_groups(&self) -> u32 {
        self.chain.num_groups(self.level)
    }

    /// Make `level` the active level
    pub fn push_level(&mut self, level: LevelId) {
        self.level = level;
        self.metrics
            .add_groups_created(u64::from(self.chain.num_groups(level)));
    }

    /// Go back to an earlier level without minting groups
    pub fn set_level(&mut self, level: LevelId) {
        self.level = level;
    }

    pub fn timezone(&self) -> FixedOffset {
        self.options.timezone
    }

    pub fn timer_mut(&mut self) -> &mut TreeTimer {
        &mut self.timer
    }

    pub fn timer(&self) -> &TreeTimer {
        &self.timer
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Earliest start over all datasets, in millis
    pub fn earliest_start(&self) -> i64 {
        self.datasets
            .iter()
            .map(|d| d.info.start_millis)
            .min()
            .unwrap_or(0)
    }

    /// Latest end over all datasets, in millis
    pub fn latest_end(&self) -> i64 {
        self.datasets
            .iter()
            .map(|d| d.info.end_millis)
            .max()
            .unwrap_or(0)
    }

    /// Fail when `num_groups` would exceed the configured limit
    pub fn check_group_limit(&self, num_groups: u64) -> ExecutionResult<()> {
        match self.options.group_limit {
            Some(limit) if num_groups > u64::from(limit) => {
                let requested = num_groups.to_string();
                let limit_text = limit.to_string();
                log_event_with_fields(
                    Event::GroupLimitExceeded,
                    &[("num_groups", requested.as_str()), ("limit", limit_text.as_str())],
                );
                Err(ExecutionError::group_limit_exceeded(num_groups, limit))
            }
            _ => Ok(()),
        }
    }

    /// Run `op` against every dataset in `scope` (all when None)
    ///
    /// Returns `(dataset, value)` pairs in dataset order once every unit
    /// has finished. The first failure in dataset order wins and carries
    /// its dataset name.
    pub async fn for_each_dataset<T, F>(
        &self,
        scope: Option<&BTreeSet<String>>,
        op: F,
    ) -> ExecutionResult<Vec<(String, T)>>
    where
        T: Send + 'static,
        F: Fn(&str, &SessionInfo, &mut dyn ImhotepSession) -> ExecutionResult<T>
            + Send
            + Sync
            + 'static,
    {
        let op = Arc::new(op);
        let units = self
            .datasets
            .iter()
            .filter(|d| scope.map_or(true, |s| s.contains(&d.name)))
            .map(|d| {
                let op = Arc::clone(&op);
                let handle = Arc::clone(&d.handle);
                let permits = Arc::clone(&self.permits);
                let name = d.name.clone();
                let info = d.info.clone();
                async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|_| ExecutionError::internal("worker permits closed"))?;
                    let unit_name = name.clone();
                    let joined = tokio::task::spawn_blocking(move || {
                        let mut session = handle
                            .lock()
                            .map_err(|_| ExecutionError::from(SessionError::Poisoned))?;
                        op(&unit_name, &info, &mut **session)
                    })
                    .await;
                    let result = joined.unwrap_or_else(|e| {
                        Err(ExecutionError::internal(format!("dataset worker failed: {}", e)))
                    });
                    match result {
                        Ok(value) => Ok((name, value)),
                        Err(e) => Err(e.with_dataset(&name)),
                    }
                }
            });
        join_all(units).await.into_iter().collect()
    }

    /// Close every remote session once in-flight units release it
    ///
    /// Units still running after a timeout hold their session's lock; each
    /// close waits on the blocking pool for that lock. Later calls, and the
    /// synchronous `close`, are no-ops. Failures are logged, never returned.
    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let closes = self.datasets.iter().map(|d| {
            let name = d.name.clone();
            let handle = Arc::clone(&d.handle);
            let metrics = Arc::clone(&self.metrics);
            async move {
                let joined = tokio::task::spawn_blocking(move || {
                    close_blocking(&name, &handle, &metrics)
                })
                .await;
                if let Err(e) = joined {
                    let reason = e.to_string();
                    log_event_with_fields(Event::SessionCloseFailed, &[("reason", reason.as_str())]);
                }
            }
        });
        join_all(closes).await;
    }

    /// Close every remote session without waiting; later calls are no-ops
    ///
    /// A session still held by a running unit is handed to a background
    /// thread that closes it as soon as the unit lets go.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for dataset in &self.datasets {
            match dataset.handle.try_lock() {
                Ok(mut session) => match session.close() {
                    Ok(()) => self.metrics.increment_sessions_closed(),
                    Err(e) => log_close_failure(&dataset.name, &e.to_string()),
                },
                Err(TryLockError::WouldBlock) => {
                    log_event_with_fields(
                        Event::SessionCloseDeferred,
                        &[("dataset", dataset.name.as_str())],
                    );
                    let name = dataset.name.clone();
                    let handle = Arc::clone(&dataset.handle);
                    let metrics = Arc::clone(&self.metrics);
                    let deferred = move || close_blocking(&name, &handle, &metrics);
                    match tokio::runtime::Handle::try_current() {
                        Ok(runtime) => {
                            runtime.spawn_blocking(deferred);
                        }
                        Err(_) => {
                            std::thread::spawn(deferred);
                        }
                    }
                }
                Err(TryLockError::Poisoned(_)) => {
                    log_close_failure(&dataset.name, &SessionError::Poisoned.to_string());
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Wait for the session's lock, then close it
fn close_blocking(name: &str, handle: &SharedSession, metrics: &MetricsRegistry) {
    let outcome = match handle.lock() {
        Ok(mut session) => session.close().map_err(|e| e.to_string()),
        Err(_) => Err(SessionError::Poisoned.to_string()),
    };
    match outcome {
        Ok(()) => metrics.increment_sessions_closed(),
        Err(reason) => log_close_failure(name, &reason),
    }
}

fn log_close_failure(dataset: &str, reason: &str) {
    log_event_with_fields(
        Event::SessionCloseFailed,
        &[("dataset", dataset), ("reason", reason)],
    );
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
