//! Shared test doubles: a scripted notation engine with a call log.
#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use spartito::{EngineError, EngineFactory, NotationEngine};

/// Records every engine method invocation, shared between the factory, the
/// engines it builds and the test body.
#[derive(Clone, Default)]
pub struct EngineLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl EngineLog {
    pub fn record(&self, entry: impl Into<String>) {
        self.calls.lock().unwrap().push(entry.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// Deterministic engine: renders `<svg data-page="N"/>`, reports a shared
/// mutable page count and optionally fails rendering on demand.
pub struct FakeEngine {
    log: EngineLog,
    page_count: Arc<AtomicU32>,
    fail_render: Arc<AtomicBool>,
}

impl NotationEngine for FakeEngine {
    fn set_options(&mut self, options: &Map<String, Value>) -> Result<(), EngineError> {
        self.log.record(format!(
            "setOptions scale={}",
            options.get("scale").cloned().unwrap_or(Value::Null)
        ));
        Ok(())
    }

    fn load_data(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.log.record(format!("loadData {} bytes", data.len()));
        Ok(())
    }

    fn redo_layout(&mut self) -> Result<(), EngineError> {
        self.log.record("redoLayout");
        Ok(())
    }

    fn render_to_svg(&mut self, page: u32) -> Result<String, EngineError> {
        self.log.record(format!("renderToSVG {page}"));
        if self.fail_render.load(Ordering::SeqCst) {
            return Err(EngineError::new("render refused"));
        }
        Ok(format!("<svg data-page=\"{page}\"/>"))
    }

    fn get_page_count(&mut self) -> Result<u32, EngineError> {
        self.log.record("getPageCount");
        Ok(self.page_count.load(Ordering::SeqCst))
    }

    fn select(&mut self, filter: &Value) -> Result<bool, EngineError> {
        self.log.record(format!("select {filter}"));
        Ok(true)
    }

    fn destroy(&mut self) {
        self.log.record("destroy");
    }
}

/// Builds [`FakeEngine`]s and counts how many were constructed.
#[derive(Clone)]
pub struct FakeFactory {
    pub log: EngineLog,
    pub page_count: Arc<AtomicU32>,
    pub fail_render: Arc<AtomicBool>,
    pub created: Arc<AtomicUsize>,
}

impl FakeFactory {
    pub fn with_pages(page_count: u32) -> Self {
        Self {
            log: EngineLog::default(),
            page_count: Arc::new(AtomicU32::new(page_count)),
            fail_render: Arc::new(AtomicBool::new(false)),
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineFactory for FakeFactory {
    async fn create(&self) -> Result<Box<dyn NotationEngine>, EngineError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEngine {
            log: self.log.clone(),
            page_count: Arc::clone(&self.page_count),
            fail_render: Arc::clone(&self.fail_render),
        }))
    }
}
