//! Session opening
//!
//! The executor asks an opener for one session per dataset. Openers are
//! shared across queries and must be thread-safe.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::errors::{SessionError, SessionResult};
use super::memory::{InMemoryIndex, InMemorySession};
use super::remote::ImhotepSession;

/// Opens remote sessions by dataset name
pub trait SessionOpener: Send + Sync {
    /// Open `dataset` restricted to `[start_millis, end_millis)`
    fn open(
        &self,
        dataset: &str,
        start_millis: i64,
        end_millis: i64,
    ) -> SessionResult<Box<dyn ImhotepSession>>;
}

impl<T: SessionOpener + ?Sized> SessionOpener for Arc<T> {
    fn open(
        &self,
        dataset: &str,
        start_millis: i64,
        end_millis: i64,
    ) -> SessionResult<Box<dyn ImhotepSession>> {
        (**self).open(dataset, start_millis, end_millis)
    }
}

/// Opener over in-memory fixture indexes
#[derive(Debug, Clone, Default)]
pub struct InMemoryOpener {
    indexes: BTreeMap<String, Arc<InMemoryIndex>>,
    group_capacity: Option<u32>,
    stats_delay: Option<Duration>,
}

impl InMemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, dataset: impl Into<String>, index: InMemoryIndex) -> Self {
        self.indexes.insert(dataset.into(), Arc::new(index));
        self
    }

    /// Cap group ids minted by every opened session
    pub fn with_group_capacity(mut self, capacity: u32) -> Self {
        self.group_capacity = Some(capacity);
        self
    }

    /// Slow down `group_stats` on every opened session
    pub fn with_stats_delay(mut self, delay: Duration) -> Self {
        self.stats_delay = Some(delay);
        self
    }

    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }
}

impl SessionOpener for InMemoryOpener {
    fn open(
        &self,
        dataset: &str,
        start_millis: i64,
        end_millis: i64,
    ) -> SessionResult<Box<dyn ImhotepSession>> {
        let index = self
            .indexes
            .get(dataset)
            .ok_or_else(|| SessionError::UnknownDataset(dataset.to_string()))?;
        let mut session = InMemorySession::open(dataset, index, start_millis, end_millis);
        if let Some(capacity) = self.group_capacity {
            session = session.with_group_capacity(capacity);
        }
        if let Some(delay) = self.stats_delay {
            session = session.with_stats_delay(delay);
        }
        Ok(Box::new(session))
    }
}
