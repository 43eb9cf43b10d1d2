#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pg_sql_utils::{
    AcquireSettings, Acquirer, ConnectFailure, ConnectionString, Connector, DbConnection, Query,
    QueryExecutor, Row, RowValues, Sleeper, SqlUtilsError, StaticConnectionString,
};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

/// What a fake connection does when asked to run a query.
#[derive(Clone)]
pub enum QueryBehavior {
    Rows(Vec<Row>),
    Fail(String),
    Panic(&'static str),
}

pub struct FakeConnection {
    behavior: QueryBehavior,
    closes: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<Query>>>,
}

#[async_trait]
impl DbConnection for FakeConnection {
    async fn query(&mut self, query: &Query) -> Result<Vec<Row>, SqlUtilsError> {
        self.queries.lock().unwrap().push(query.clone());
        match &self.behavior {
            QueryBehavior::Rows(rows) => Ok(rows.clone()),
            QueryBehavior::Fail(msg) => Err(SqlUtilsError::QueryError(msg.clone())),
            QueryBehavior::Panic(msg) => panic!("{msg}"),
        }
    }

    async fn close(self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector that plays back a script of attempt outcomes, then succeeds.
pub struct FakeConnector {
    script: Mutex<VecDeque<ConnectFailure>>,
    attempts: AtomicU32,
    seen: Mutex<Vec<String>>,
    pub closes: Arc<AtomicUsize>,
    pub queries: Arc<Mutex<Vec<Query>>>,
    behavior: QueryBehavior,
}

impl FakeConnector {
    pub fn new(failures: impl IntoIterator<Item = ConnectFailure>) -> Self {
        Self {
            script: Mutex::new(failures.into_iter().collect()),
            attempts: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
            closes: Arc::new(AtomicUsize::new(0)),
            queries: Arc::new(Mutex::new(Vec::new())),
            behavior: QueryBehavior::Rows(Vec::new()),
        }
    }

    pub fn always_ok() -> Self {
        Self::new([])
    }

    pub fn operational_failures(count: usize) -> Self {
        Self::new((0..count).map(|i| ConnectFailure::Operational(format!("refused #{i}"))))
    }

    pub fn with_behavior(mut self, behavior: QueryBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Connection strings exactly as the connector received them.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        connection_string: &ConnectionString,
        _timeout: Duration,
    ) -> Result<FakeConnection, ConnectFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push(connection_string.expose().to_string());
        if let Some(failure) = self.script.lock().unwrap().pop_front() {
            return Err(failure);
        }
        Ok(FakeConnection {
            behavior: self.behavior.clone(),
            closes: Arc::clone(&self.closes),
            queries: Arc::clone(&self.queries),
        })
    }
}

/// Records requested backoff delays instead of sleeping.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

pub fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_secs).collect()
}

pub fn acquirer(
    url: Option<&str>,
    connector: FakeConnector,
    settings: AcquireSettings,
) -> (
    Acquirer<StaticConnectionString, FakeConnector, RecordingSleeper>,
    RecordingSleeper,
) {
    let provider = url.map_or_else(StaticConnectionString::unset, StaticConnectionString::new);
    let sleeper = RecordingSleeper::default();
    let acquirer = Acquirer::new(provider, connector, settings).with_sleeper(sleeper.clone());
    (acquirer, sleeper)
}

pub fn executor(
    url: Option<&str>,
    connector: FakeConnector,
) -> (
    QueryExecutor<StaticConnectionString, FakeConnector, RecordingSleeper>,
    RecordingSleeper,
) {
    let (acquirer, sleeper) = acquirer(url, connector, AcquireSettings::default());
    (QueryExecutor::new(acquirer), sleeper)
}

pub fn version_row() -> Row {
    Row::new(
        Arc::new(vec!["version".to_string()]),
        vec![RowValues::Text("PostgreSQL 16.4 on x86_64-pc-linux-gnu".into())],
    )
}

/// Log sink that keeps everything written to it.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

pub struct CaptureGuard(Arc<Mutex<Vec<u8>>>);

impl Write for CaptureGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CaptureGuard;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureGuard(Arc::clone(&self.0))
    }
}

pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
}

/// Drive `fut` to completion on this thread and return its output with every log line it
/// produced.
pub fn run_with_logs<F: Future>(fut: F) -> (F::Output, String) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_target(true)
        .with_ansi(false)
        .with_max_level(Level::DEBUG)
        .finish();
    let rt = runtime();
    let output = tracing::subscriber::with_default(subscriber, || rt.block_on(fut));
    (output, logs.contents())
}
