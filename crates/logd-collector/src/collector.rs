//! The collector
//!
//! [`Collector`] ties the pieces together: the persisted set of registered
//! logs, one [`StreamWorker`] per log, the shared event store, and the
//! periodic eviction task.
//!
//! Every operation that reads or changes the registered logs runs on a
//! single-writer [`Agent`], so concurrent callers observe them in some
//! serial order. Store access runs on the blocking pool: reads after the
//! agent has resolved which logs they cover, and direct appends, clears and
//! eviction straight away, since the store serializes writes itself.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use logd_core::{
    Cursor, Direction, EventId, EventWithCursors, truncate_message, validate_log_name,
};
use logd_storage::{Store, codec};
use parking_lot::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::agent::{Agent, AgentOutcome};
use crate::api::{EventsPage, GetEventsInput, LogDescription};
use crate::config::CollectorConfig;
use crate::error::{CollectorError, CollectorResult};
use crate::eviction::{EvictionTask, evict_all};
use crate::state::{CollectorState, LogState, StateFile};
use crate::worker::StreamWorker;

struct WorkerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Collector state owned by the agent
struct Registry {
    state: CollectorState,
    state_file: StateFile,
    store: Store,
    workers: HashMap<String, WorkerHandle>,
    cancel: CancellationToken,
    max_message_size: usize,
}

impl Registry {
    fn start_worker(&mut self, name: &str, source: &str) {
        let cancel = self.cancel.child_token();
        let worker = StreamWorker::new(self.store.log(name), source, self.max_message_size);
        let log = name.to_owned();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            match worker.run(token).await {
                Ok(()) => debug!(log = %log, "Worker finished"),
                Err(e) => error!(log = %log, error = %e, "Worker failed"),
            }
        });
        self.workers.insert(name.to_owned(), WorkerHandle { cancel, task });
    }

    fn start_all(&mut self) {
        let logs: Vec<(String, String)> = self
            .state
            .logs
            .iter()
            .map(|(name, log)| (name.clone(), log.source.clone()))
            .collect();
        for (name, source) in logs {
            self.start_worker(&name, &source);
        }
    }

    fn add_log(&mut self, name: String, source: String) -> CollectorResult<()> {
        validate_log_name(&name)?;
        if source.is_empty() {
            return Err(CollectorError::MissingSource(name));
        }
        if self.state.logs.contains_key(&name) {
            return Err(CollectorError::DuplicateLog(name));
        }

        self.state.logs.insert(
            name.clone(),
            LogState {
                source: source.clone(),
            },
        );
        if let Err(e) = self.state_file.save(&self.state) {
            self.state.logs.remove(&name);
            return Err(e);
        }

        self.start_worker(&name, &source);
        info!(log = %name, source = %source, "Log added");
        Ok(())
    }

    /// Unregister `name`, returning its worker task to await
    fn remove_log(&mut self, name: &str) -> CollectorResult<Option<JoinHandle<()>>> {
        let Some(previous) = self.state.logs.remove(name) else {
            return Ok(None);
        };
        if let Err(e) = self.state_file.save(&self.state) {
            self.state.logs.insert(name.to_owned(), previous);
            return Err(e);
        }

        info!(log = %name, "Log removed");
        Ok(self.workers.remove(name).map(|worker| {
            worker.cancel.cancel();
            worker.task
        }))
    }

    /// Pair each named log with its registered source, or list every
    /// registered log when `names` is empty
    fn describe_targets(&self, names: Vec<String>) -> Vec<(String, Option<String>)> {
        if names.is_empty() {
            return self
                .state
                .logs
                .iter()
                .map(|(name, log)| (name.clone(), Some(log.source.clone())))
                .collect();
        }
        names
            .into_iter()
            .map(|name| {
                let source = self.state.logs.get(&name).map(|log| log.source.clone());
                (name, source)
            })
            .collect()
    }

    /// The logs a page reads: the named ones, or every registered log
    fn page_logs(&self, logs: Vec<String>) -> Vec<String> {
        let mut logs = if logs.is_empty() {
            self.state.logs.keys().cloned().collect()
        } else {
            logs
        };
        logs.sort();
        logs.dedup();
        logs
    }

    fn active_workers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, worker)| !worker.task.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

fn describe(
    store: &Store,
    targets: Vec<(String, Option<String>)>,
) -> CollectorResult<Vec<LogDescription>> {
    targets
        .into_iter()
        .map(|(name, source)| {
            let last_event_at = store
                .log(name.as_str())
                .get_last_event()?
                .map(|event| event.timestamp);
            Ok(LogDescription {
                name,
                source,
                last_event_at,
            })
        })
        .collect()
}

fn read_page(
    store: &Store,
    logs: Vec<String>,
    cursor: Option<Cursor>,
    limit: usize,
    filter: Option<String>,
) -> CollectorResult<EventsPage> {
    let direction = cursor.map_or(Direction::Backward, |c| c.direction);
    let bound = cursor.map(|c| c.id);

    let mut items = Vec::new();
    for name in logs {
        items.extend(store.log(name).get_events(
            bound.as_ref(),
            limit,
            direction,
            filter.as_deref(),
        )?);
    }
    Ok(paginate(items, cursor, limit))
}

/// Merge per-log pages into one page of at most `limit` events
///
/// A forward scan keeps the oldest `limit` events, a backward scan the
/// newest. `next_cursor` continues the scan, `prev_cursor` reverses it.
pub(crate) fn paginate(
    mut items: Vec<EventWithCursors>,
    cursor: Option<Cursor>,
    limit: usize,
) -> EventsPage {
    let direction = cursor.map_or(Direction::Backward, |c| c.direction);

    items.sort_by_key(|item| item.event.id);
    if items.len() > limit {
        match direction {
            Direction::Forward => items.truncate(limit),
            Direction::Backward => {
                items.drain(..items.len() - limit);
            }
        }
    }

    let (prev, next) = match (items.first(), items.last()) {
        (Some(first), Some(last)) => match direction {
            Direction::Forward => (first.prev_cursor, last.next_cursor),
            Direction::Backward => (last.next_cursor, first.prev_cursor),
        },
        _ => match cursor {
            Some(cursor) => (cursor.reversed(), cursor),
            None => (Cursor::start(), Cursor::start()),
        },
    };

    EventsPage {
        items: items.into_iter().map(|item| item.event).collect(),
        prev_cursor: prev.serialize(),
        next_cursor: next.serialize(),
    }
}

struct Running {
    agent: Agent<Registry>,
    store: Store,
    cancel: CancellationToken,
    agent_task: JoinHandle<AgentOutcome<Registry>>,
    eviction_task: JoinHandle<()>,
}

enum Phase {
    Idle,
    Running(Running),
    Stopped,
}

struct CollectorInner {
    config: CollectorConfig,
    phase: Mutex<Phase>,
}

/// Collects newline-delimited streams and syslog messages into named logs
///
/// Cloning is cheap; clones share the same running collector.
#[derive(Clone)]
pub struct Collector {
    inner: Arc<CollectorInner>,
}

impl Collector {
    /// Create a collector; nothing is opened until [`Collector::start`]
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                config,
                phase: Mutex::new(Phase::Idle),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &CollectorConfig {
        &self.inner.config
    }

    /// Check whether the collector is running
    pub fn is_started(&self) -> bool {
        matches!(*self.inner.phase.lock(), Phase::Running(_))
    }

    /// Load the registered logs, open the store and start every worker
    ///
    /// A stopped collector may be started again.
    #[instrument(skip(self), fields(home = %self.inner.config.home_dir.display()))]
    pub async fn start(&self) -> CollectorResult<()> {
        let mut phase = self.inner.phase.lock();
        if matches!(*phase, Phase::Running(_)) {
            return Err(CollectorError::AlreadyStarted);
        }

        let config = &self.inner.config;
        fs::create_dir_all(&config.home_dir)?;
        let state_file = StateFile::new(config.state_path());
        let state = state_file.load()?;
        let store = Store::open(config.store.clone())?;
        let cancel = CancellationToken::new();

        let mut registry = Registry {
            state,
            state_file,
            store: store.clone(),
            workers: HashMap::new(),
            cancel: cancel.clone(),
            max_message_size: config.max_message_size,
        };
        registry.start_all();
        let logs = registry.state.logs.len();

        let (agent, runner) = Agent::new(registry, config.agent_inbox_capacity);
        let agent_task = tokio::spawn(runner.run(cancel.clone()));
        let eviction_task =
            EvictionTask::spawn(store.clone(), config.eviction_interval, cancel.clone());

        *phase = Phase::Running(Running {
            agent,
            store,
            cancel,
            agent_task,
            eviction_task,
        });
        info!(logs, "Collector started");
        Ok(())
    }

    /// Stop every worker and background task, then close the store
    ///
    /// Calling this more than once, or before `start`, is a no-op.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> CollectorResult<()> {
        let running = {
            let mut phase = self.inner.phase.lock();
            match std::mem::replace(&mut *phase, Phase::Stopped) {
                Phase::Running(running) => running,
                previous => {
                    *phase = previous;
                    return Ok(());
                }
            }
        };

        running.cancel.cancel();

        if let Err(e) = running.eviction_task.await {
            warn!(error = %e, "Eviction task aborted");
        }

        match running.agent_task.await {
            Ok(outcome) => {
                if let Some(failure) = &outcome.failure {
                    error!(error = %failure, "Agent failed");
                }
                let mut registry = outcome.state;
                let workers = std::mem::take(&mut registry.workers);
                for (name, worker) in workers {
                    if let Err(e) = worker.task.await {
                        warn!(log = %name, error = %e, "Worker task aborted");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Agent task aborted"),
        }

        let store = running.store;
        tokio::task::spawn_blocking(move || store.close())
            .await
            .map_err(blocking_failed)?;

        info!("Collector stopped");
        Ok(())
    }

    /// Register a log and start reading `source` into it
    #[instrument(skip(self))]
    pub async fn add_log(&self, name: &str, source: &str) -> CollectorResult<()> {
        let agent = self.agent()?;
        let (name, source) = (name.to_owned(), source.to_owned());
        agent
            .send(move |registry| registry.add_log(name, source))
            .await?
    }

    /// Unregister a log and stop its worker
    ///
    /// Stored events are kept; see [`Collector::clear_events`]. Returns once
    /// the worker has finished, so no further events reach the log from its
    /// source. Unknown names are ignored.
    #[instrument(skip(self))]
    pub async fn remove_log(&self, name: &str) -> CollectorResult<()> {
        let agent = self.agent()?;
        let owned = name.to_owned();
        let task = agent
            .send(move |registry| registry.remove_log(&owned))
            .await??;

        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(log = %name, error = %e, "Worker task aborted");
            }
            debug!(log = %name, "Worker stopped");
        }
        Ok(())
    }

    /// Describe the named logs, or every registered log when `names` is empty
    pub async fn describe_logs(&self, names: &[String]) -> CollectorResult<Vec<LogDescription>> {
        for name in names {
            validate_log_name(name)?;
        }
        let agent = self.agent()?;
        let store = self.store()?;
        let names = names.to_vec();
        let targets = agent
            .send(move |registry| registry.describe_targets(names))
            .await?;
        tokio::task::spawn_blocking(move || describe(&store, targets))
            .await
            .map_err(blocking_failed)?
    }

    /// Read one page of events merged across logs
    pub async fn get_events(&self, input: GetEventsInput) -> CollectorResult<EventsPage> {
        let config = &self.inner.config;
        let limit = input.limit.unwrap_or(config.default_limit);
        if limit == 0 || limit > config.max_limit {
            return Err(CollectorError::InvalidLimit {
                limit,
                max: config.max_limit,
            });
        }
        let cursor = match input.cursor.as_deref() {
            None | Some("") => None,
            Some(text) => Some(Cursor::parse(text)?),
        };
        for name in &input.logs {
            validate_log_name(name)?;
        }
        let filter = input.filter.filter(|f| !f.is_empty());

        let agent = self.agent()?;
        let store = self.store()?;
        let logs = input.logs;
        let logs = agent.send(move |registry| registry.page_logs(logs)).await?;
        tokio::task::spawn_blocking(move || read_page(&store, logs, cursor, limit, filter))
            .await
            .map_err(blocking_failed)?
    }

    /// Append one event directly, truncating `message` to the maximum size
    pub async fn add_event(
        &self,
        log: &str,
        timestamp: DateTime<Utc>,
        message: &[u8],
    ) -> CollectorResult<EventId> {
        validate_log_name(log)?;
        if codec::timestamp_nanos(timestamp).is_none() {
            return Err(CollectorError::InvalidTimestamp(timestamp.to_rfc3339()));
        }
        let store = self.store()?;
        let log = store.log(log);
        let message = truncate_message(message, self.inner.config.max_message_size).to_vec();
        let id = tokio::task::spawn_blocking(move || log.add_event(timestamp, &message))
            .await
            .map_err(blocking_failed)??;
        Ok(id)
    }

    /// Delete every event of the named logs; returns how many were removed
    #[instrument(skip(self))]
    pub async fn clear_events(&self, logs: &[String]) -> CollectorResult<usize> {
        for name in logs {
            validate_log_name(name)?;
        }
        let store = self.store()?;
        let logs = logs.to_vec();
        let removed = tokio::task::spawn_blocking(move || {
            let mut removed = 0;
            for name in logs {
                removed += store.log(name).clear_events()?;
            }
            Ok::<_, CollectorError>(removed)
        })
        .await
        .map_err(blocking_failed)??;
        Ok(removed)
    }

    /// Trim every stored log to the retention bound
    pub async fn remove_old_events(&self) -> CollectorResult<usize> {
        let store = self.store()?;
        let removed = tokio::task::spawn_blocking(move || evict_all(&store))
            .await
            .map_err(blocking_failed)??;
        Ok(removed)
    }

    /// Names of registered logs whose worker is still reading
    pub async fn active_workers(&self) -> CollectorResult<Vec<String>> {
        let agent = self.agent()?;
        Ok(agent.send(|registry| registry.active_workers()).await?)
    }

    fn agent(&self) -> CollectorResult<Agent<Registry>> {
        match &*self.inner.phase.lock() {
            Phase::Running(running) => Ok(running.agent.clone()),
            _ => Err(CollectorError::NotStarted),
        }
    }

    fn store(&self) -> CollectorResult<Store> {
        match &*self.inner.phase.lock() {
            Phase::Running(running) => Ok(running.store.clone()),
            _ => Err(CollectorError::NotStarted),
        }
    }
}

fn blocking_failed(err: JoinError) -> CollectorError {
    CollectorError::io(format!("blocking task failed: {}", err))
}
