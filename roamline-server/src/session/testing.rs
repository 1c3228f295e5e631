//! In-memory connection pool for tests
//!
//! Records every statement per connection and models the parts of Postgres the
//! session relies on: session-level settings that survive across borrowers,
//! transaction-local settings that vanish at COMMIT/ROLLBACK, and writes that only
//! become visible once committed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::connection::{ConnectionSource, SessionConnection};

type ProbeFn =
    Box<dyn Fn(&str, &[String], &BTreeMap<String, String>) -> Result<Vec<Value>, String> + Send + Sync>;

/// Statement kinds recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Acquired,
    Begin,
    Set(String, String),
    Query(String),
    Commit,
    Rollback,
    Clear,
    Returned,
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub conn: usize,
    pub op: Op,
}

/// Statements that fail on purpose
#[derive(Debug, Default, Clone)]
pub struct Faults {
    pub begin: bool,
    pub set_local: bool,
    pub commit: bool,
    pub rollback: bool,
    pub clear: bool,
}

struct ConnState {
    id: usize,
    session: BTreeMap<String, String>,
    local: BTreeMap<String, String>,
    pending: Vec<String>,
    /// A statement failed inside the open transaction
    aborted: bool,
}

impl ConnState {
    fn new(id: usize) -> Self {
        Self {
            id,
            session: BTreeMap::new(),
            local: BTreeMap::new(),
            pending: Vec::new(),
            aborted: false,
        }
    }

    fn effective(&self) -> BTreeMap<String, String> {
        let mut settings = self.session.clone();
        settings.extend(self.local.clone());
        settings
    }
}

struct PoolInner {
    idle: tokio::sync::Mutex<mpsc::UnboundedReceiver<ConnState>>,
    returns: mpsc::UnboundedSender<ConnState>,
    idle_count: AtomicUsize,
    next_id: AtomicUsize,
    log: Mutex<Vec<Event>>,
    faults: Mutex<Faults>,
    committed: Mutex<Vec<String>>,
    probe: Mutex<Option<ProbeFn>>,
}

impl PoolInner {
    fn record(&self, conn: usize, op: Op) {
        self.log.lock().unwrap().push(Event { conn, op });
    }

    fn faults(&self) -> Faults {
        self.faults.lock().unwrap().clone()
    }

    fn give_back(&self, state: ConnState) {
        self.idle_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.returns.send(state);
    }
}

fn injected(what: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("injected {what} failure"))
}

#[derive(Clone)]
pub struct MockPool {
    inner: Arc<PoolInner>,
}

impl MockPool {
    pub fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(PoolInner {
            idle: tokio::sync::Mutex::new(rx),
            returns: tx,
            idle_count: AtomicUsize::new(0),
            next_id: AtomicUsize::new(size),
            log: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
            committed: Mutex::new(Vec::new()),
            probe: Mutex::new(None),
        });
        for id in 0..size {
            inner.give_back(ConnState::new(id));
        }
        Self { inner }
    }

    /// Leave a session-level value on every idle connection, as a careless earlier
    /// borrower would.
    pub async fn seed_leftover(&self, key: &str, value: &str) {
        let mut rx = self.inner.idle.lock().await;
        let mut drained = Vec::new();
        while let Ok(mut state) = rx.try_recv() {
            state.session.insert(key.to_string(), value.to_string());
            drained.push(state);
        }
        for state in drained {
            let _ = self.inner.returns.send(state);
        }
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.inner.faults.lock().unwrap() = faults;
    }

    /// Answer probes with `f(sql, params, effective settings)`.
    pub fn on_probe<F>(&self, f: F)
    where
        F: Fn(&str, &[String], &BTreeMap<String, String>) -> Result<Vec<Value>, String>
            + Send
            + Sync
            + 'static,
    {
        *self.inner.probe.lock().unwrap() = Some(Box::new(f));
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.log.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.events().into_iter().map(|e| e.op).collect()
    }

    pub fn committed(&self) -> Vec<String> {
        self.inner.committed.lock().unwrap().clone()
    }

    pub fn idle(&self) -> usize {
        self.inner.idle_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionSource for MockPool {
    type Connection = MockConnection;

    async fn acquire(&self) -> Result<MockConnection, sqlx::Error> {
        let mut rx = self.inner.idle.lock().await;
        let state = rx.recv().await.ok_or(sqlx::Error::PoolClosed)?;
        self.inner.idle_count.fetch_sub(1, Ordering::SeqCst);
        self.inner.record(state.id, Op::Acquired);

        Ok(MockConnection {
            state: Some(state),
            pool: self.inner.clone(),
        })
    }
}

pub struct MockConnection {
    state: Option<ConnState>,
    pool: Arc<PoolInner>,
}

impl MockConnection {
    fn state(&mut self) -> &mut ConnState {
        self.state.as_mut().expect("connection already gone")
    }

    pub fn id(&self) -> usize {
        self.state.as_ref().map(|s| s.id).unwrap_or(usize::MAX)
    }

    /// Setting as a policy would see it right now.
    pub fn setting(&self, key: &str) -> Option<String> {
        self.state.as_ref().and_then(|s| s.effective().get(key).cloned())
    }

    /// Handler-style query through the bound connection.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<Value>, sqlx::Error> {
        self.fetch_json(sql, &[]).await
    }
}

#[async_trait]
impl SessionConnection for MockConnection {
    async fn begin(&mut self) -> Result<(), sqlx::Error> {
        if self.pool.faults().begin {
            return Err(injected("BEGIN"));
        }
        let id = self.state().id;
        self.pool.record(id, Op::Begin);
        Ok(())
    }

    async fn set_local(&mut self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        if self.pool.faults().set_local {
            return Err(injected("set_config"));
        }
        let state = self.state();
        state.local.insert(key.to_string(), value.to_string());
        let id = state.id;
        self.pool.record(id, Op::Set(key.to_string(), value.to_string()));
        Ok(())
    }

    async fn fetch_json(&mut self, sql: &str, params: &[String]) -> Result<Vec<Value>, sqlx::Error> {
        let pool = self.pool.clone();
        let state = self.state();
        pool.record(state.id, Op::Query(sql.to_string()));

        let verb = sql.trim_start().to_ascii_uppercase();
        if ["INSERT", "UPDATE", "DELETE"].iter().any(|v| verb.starts_with(v)) {
            state.pending.push(sql.to_string());
        }

        let settings = state.effective();
        let probe = pool.probe.lock().unwrap();
        let rows = match probe.as_ref() {
            Some(f) => f(sql, params, &settings).map_err(sqlx::Error::Protocol),
            None => Ok(Vec::new()),
        };
        if rows.is_err() {
            state.aborted = true;
        }
        rows
    }

    async fn transaction_aborted(&mut self) -> Result<bool, sqlx::Error> {
        Ok(self.state().aborted)
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        if self.pool.faults().commit {
            return Err(injected("COMMIT"));
        }
        let pool = self.pool.clone();
        let state = self.state();
        if state.aborted {
            // Postgres turns COMMIT of an aborted transaction into a rollback
            state.pending.clear();
        } else {
            pool.committed.lock().unwrap().append(&mut state.pending);
        }
        state.aborted = false;
        state.local.clear();
        pool.record(state.id, Op::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        if self.pool.faults().rollback {
            return Err(injected("ROLLBACK"));
        }
        let state = self.state();
        state.pending.clear();
        state.local.clear();
        state.aborted = false;
        let id = state.id;
        self.pool.record(id, Op::Rollback);
        Ok(())
    }

    async fn clear(&mut self, keys: &[&str]) -> Result<(), sqlx::Error> {
        if self.pool.faults().clear {
            return Err(injected("clear"));
        }
        let state = self.state();
        for key in keys {
            state.session.insert(key.to_string(), String::new());
        }
        let id = state.id;
        self.pool.record(id, Op::Clear);
        Ok(())
    }

    async fn discard(mut self) {
        if let Some(state) = self.state.take() {
            self.pool.record(state.id, Op::Discarded);
            // The real pool opens a fresh connection in place of a closed one
            let id = self.pool.next_id.fetch_add(1, Ordering::SeqCst);
            self.pool.give_back(ConnState::new(id));
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.pool.record(state.id, Op::Returned);
            self.pool.give_back(state);
        }
    }
}
