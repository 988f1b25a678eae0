//! Shared test services

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use service_environment::{RuntimeContext, Service};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lifecycle calls observed across every service of one test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartBegin(String),
    StartEnd(String),
    StartFailed(String),
    Stop(String),
}

#[derive(Debug, Default, Clone)]
pub struct Recorder(Arc<Mutex<Vec<Call>>>);

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    /// Position of the first matching call
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn stops(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Stop(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }
}

pub fn start_begin(id: &str) -> Call {
    Call::StartBegin(id.to_string())
}

pub fn start_end(id: &str) -> Call {
    Call::StartEnd(id.to_string())
}

pub fn start_failed(id: &str) -> Call {
    Call::StartFailed(id.to_string())
}

/// Service that records its calls and can be told to fail
pub struct MockService {
    id: String,
    recorder: Recorder,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: bool,
    fail_stop: bool,
    delay: Duration,
    /// Ids that must be in the catalog when `start` runs
    expects: Vec<String>,
}

impl MockService {
    pub fn new(id: &str, recorder: &Recorder) -> Self {
        Self {
            id: id.to_string(),
            recorder: recorder.clone(),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_start: false,
            fail_stop: false,
            delay: Duration::from_millis(5),
            expects: Vec::new(),
        }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn expecting(mut self, ids: &[&str]) -> Self {
        self.expects = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for MockService {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self, ctx: &RuntimeContext) -> anyhow::Result<Value> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.recorder.push(Call::StartBegin(self.id.clone()));

        for id in &self.expects {
            anyhow::ensure!(ctx.contains(id), "{} is not in the catalog", id);
        }
        smol::Timer::after(self.delay).await;

        if self.fail_start {
            self.recorder.push(Call::StartFailed(self.id.clone()));
            anyhow::bail!("synthetic-start-error");
        }
        self.recorder.push(Call::StartEnd(self.id.clone()));
        Ok(json!({ "name": self.id, "env": ctx.name() }))
    }

    async fn stop(&self, _ctx: &RuntimeContext) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.recorder.push(Call::Stop(self.id.clone()));

        if self.fail_stop {
            anyhow::bail!("synthetic-stop-error");
        }
        Ok(())
    }
}

/// Upcast for registration
pub fn svc(service: &Arc<MockService>) -> Arc<dyn Service> {
    Arc::clone(service) as Arc<dyn Service>
}
