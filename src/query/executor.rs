//! Query executor
//!
//! Per query:
//!
//! 1. Validate, assign a query id
//! 2. Serve from the result cache when possible
//! 3. Open one session per dataset, wrapping aliased ones
//! 4. Run the pipeline under the configured timeout
//! 5. Close every session, whatever happened
//! 6. Render, truncate and cache the result table

use std::sync::Arc;

use uuid::Uuid;

use crate::cache::{create_cache, lookup, store, CacheKey, CacheLookup, QueryCache};
use crate::config::EngineConfig;
use crate::execution::{run_commands, ExecutionError, Session, SessionOptions};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, ObservationScope};
use crate::progress::{notify, ProgressCallback};
use crate::session::{AliasingSession, ImhotepSession, SessionOpener};

use super::errors::{QueryError, QueryResult};
use super::model::Query;
use super::result::ResultTable;

/// What a finished query hands back
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub query_id: String,
    pub cache_key: CacheKey,
    pub table: ResultTable,
    /// Served from the result cache without opening sessions
    pub cached: bool,
    /// Indented per-command timing summary; empty for cached results
    pub timings: String,
}

/// Runs compiled queries against sessions from one opener
pub struct QueryExecutor {
    config: EngineConfig,
    opener: Arc<dyn SessionOpener>,
    cache: Arc<dyn QueryCache>,
    metrics: Arc<MetricsRegistry>,
}

impl QueryExecutor {
    /// Executor with the cache described by `config.cache`
    pub fn new(config: EngineConfig, opener: Arc<dyn SessionOpener>) -> QueryResult<Self> {
        let cache = create_cache(&config.cache)?;
        Ok(Self {
            config,
            opener,
            cache,
            metrics: Arc::new(MetricsRegistry::new()),
        })
    }

    /// Replace the configured cache
    pub fn with_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        query: &Query,
        progress: &dyn ProgressCallback,
    ) -> QueryResult<QueryOutcome> {
        query.validate()?;

        let query_id = Uuid::new_v4().to_string();
        notify("query_id_assigned", progress.query_id_assigned(&query_id));

        let cache_key = query.cache_key();
        let scope = ObservationScope::with_fields(
            "QUERY",
            &[
                ("cache_file", cache_key.file_name.as_str()),
                ("query_id", query_id.as_str()),
            ],
        );

        let use_cache = !query.has_option("nocache");
        if use_cache {
            if let Some(table) = self.read_cached(query, &cache_key) {
                self.metrics.increment_queries_executed();
                let rows = table.len().to_string();
                scope.complete_with_fields(&[("cached", "true"), ("rows", rows.as_str())]);
                return Ok(QueryOutcome {
                    query_id,
                    cache_key,
                    table,
                    cached: true,
                    timings: String::new(),
                });
            }
        }

        match self.run(query, progress).await {
            Ok((table, timings)) => {
                if use_cache && self.cache.is_enabled() {
                    self.write_cached(&cache_key, &table);
                }
                self.metrics.increment_queries_executed();
                let rows = table.len().to_string();
                scope.complete_with_fields(&[
                    ("cached", "false"),
                    ("rows", rows.as_str()),
                    ("timings", timings.as_str()),
                ]);
                Ok(QueryOutcome {
                    query_id,
                    cache_key,
                    table,
                    cached: false,
                    timings,
                })
            }
            Err(e) => {
                self.metrics.increment_queries_failed();
                if e.is_fatal() {
                    scope.fail_fatal(&e.to_string());
                } else {
                    scope.fail(&e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Cached table for `key`, or None when it must be computed
    fn read_cached(&self, query: &Query, key: &CacheKey) -> Option<ResultTable> {
        let file = key.file_name.as_str();
        match lookup(self.cache.as_ref(), file) {
            Ok(CacheLookup::Disabled) => {
                log_event_with_fields(Event::CacheDisabled, &[("file", file)]);
                None
            }
            Ok(CacheLookup::Miss) => {
                self.metrics.increment_cache_misses();
                log_event_with_fields(Event::CacheMiss, &[("file", file)]);
                None
            }
            Ok(CacheLookup::Hit(bytes)) => {
                let parsed = String::from_utf8(bytes)
                    .map_err(|e| QueryError::Table(e.to_string()))
                    .and_then(|text| ResultTable::from_tsv(&text, query.num_stats().unwrap_or(0)));
                match parsed {
                    Ok(table) => {
                        self.metrics.increment_cache_hits();
                        log_event_with_fields(Event::CacheHit, &[("file", file)]);
                        Some(table)
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        log_event_with_fields(
                            Event::CacheReadFailed,
                            &[("file", file), ("reason", reason.as_str())],
                        );
                        None
                    }
                }
            }
            Err(e) => {
                let reason = e.to_string();
                log_event_with_fields(
                    Event::CacheReadFailed,
                    &[("file", file), ("reason", reason.as_str())],
                );
                None
            }
        }
    }

    fn write_cached(&self, key: &CacheKey, table: &ResultTable) {
        let file = key.file_name.as_str();
        match store(self.cache.as_ref(), file, table.to_tsv().as_bytes()) {
            Ok(()) => log_event_with_fields(Event::CacheWriteComplete, &[("file", file)]),
            Err(e) => {
                self.metrics.increment_cache_write_failures();
                let reason = e.to_string();
                log_event_with_fields(
                    Event::CacheWriteFailed,
                    &[("file", file), ("reason", reason.as_str())],
                );
            }
        }
    }

    /// Open sessions, run the pipeline, close everything
    async fn run(
        &self,
        query: &Query,
        progress: &dyn ProgressCallback,
    ) -> QueryResult<(ResultTable, String)> {
        notify("start_session", progress.start_session(Some(query.commands.len())));

        let sessions = self.open_sessions(query)?;
        self.metrics.add_sessions_opened(sessions.len() as u64);

        let options = SessionOptions {
            group_limit: self.config.effective_group_limit(),
            max_parallelism: self.config.max_parallelism,
            timezone: self.config.timezone(),
        };
        let mut session = Session::new(sessions, options, Arc::clone(&self.metrics));

        let opened = session.dataset_names().join(",");
        log_event_with_fields(Event::SessionsOpened, &[("datasets", opened.as_str())]);
        notify("sessions_opened", progress.sessions_opened(&session.infos()));

        let timeout = self.config.query_timeout();
        let result = tokio::time::timeout(
            timeout,
            run_commands(&mut session, &query.commands, progress),
        )
        .await;
        // Units still running past the timeout close their session on release
        session.close();

        let outputs = match result {
            Ok(outputs) => outputs?,
            Err(_) => return Err(ExecutionError::timeout(self.config.query_timeout_ms).into()),
        };

        let mut table = ResultTable::from_outputs(outputs);
        table.truncate(query.row_limit);
        Ok((table, session.timer().summary()))
    }

    /// One session per dataset, in query order
    ///
    /// Sessions already opened are closed when a later one fails.
    fn open_sessions(&self, query: &Query) -> QueryResult<Vec<(String, Box<dyn ImhotepSession>)>> {
        let mut opened: Vec<(String, Box<dyn ImhotepSession>)> =
            Vec::with_capacity(query.datasets.len());
        for dataset in &query.datasets {
            let attempt = self
                .opener
                .open(&dataset.name, dataset.start_millis, dataset.end_millis)
                .and_then(|session| {
                    if dataset.aliases.is_empty() {
                        Ok(session)
                    } else {
                        AliasingSession::new(session, &dataset.aliases)
                            .map(|s| Box::new(s) as Box<dyn ImhotepSession>)
                    }
                });
            match attempt {
                Ok(session) => opened.push((dataset.name.clone(), session)),
                Err(source) => {
                    for (name, mut session) in opened {
                        if let Err(e) = session.close() {
                            let reason = e.to_string();
                            log_event_with_fields(
                                Event::SessionCloseFailed,
                                &[("dataset", name.as_str()), ("reason", reason.as_str())],
                            );
                        }
                    }
                    return Err(QueryError::Open {
                        dataset: dataset.name.clone(),
                        source,
                    });
                }
            }
        }
        Ok(opened)
    }
}
