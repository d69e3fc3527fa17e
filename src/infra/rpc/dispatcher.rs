//! Engine side of the channel.
//!
//! The dispatcher owns the actual engine instances, keyed by the request's
//! instance id. Instances are constructed lazily on first reference, after
//! the module-ready gate opens. Each request is served on its own task so a
//! slow method (or one still waiting on the gate) never blocks receipt of
//! unrelated requests; per-instance execution is serialized by the slot's
//! async mutex.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Value, json};
use spartito_protocol::{RequestEnvelope, ResponseEnvelope, methods};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::infra::channel::HostEndpoint;
use crate::infra::engine::{EngineError, EngineFactory, NotationEngine};
use crate::util::Deferred;

/// Per-session readiness gate for the engine module.
///
/// The runtime's startup signal fires exactly once per module; the gate
/// fans that signal out to every waiter. A second signal is ignored. The
/// gate is owned by whoever wires the session together and passed to the
/// dispatcher explicitly; there is no process-wide readiness state.
#[derive(Debug, Clone, Default)]
pub struct ModuleGate {
    state: Deferred<(), String>,
}

impl ModuleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired by the engine runtime once its asynchronous startup finished.
    /// Idempotent: only the first signal changes anything.
    pub fn signal_ready(&self) -> bool {
        self.state.resolve(())
    }

    /// Record a startup failure; every waiter observes the message.
    pub fn signal_failed(&self, message: impl Into<String>) -> bool {
        self.state.reject(message.into())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state.peek(), Some(Ok(())))
    }

    pub(crate) async fn wait(&self) -> Result<(), String> {
        self.state.wait().await
    }
}

/// One lazily constructed engine instance. The mutex both serializes method
/// execution and guards construction, so two racing first calls build the
/// engine exactly once.
struct EngineSlot {
    engine: Mutex<Option<Box<dyn NotationEngine>>>,
}

impl EngineSlot {
    fn empty() -> Arc<Self> {
        Arc::new(Self {
            engine: Mutex::new(None),
        })
    }
}

/// Serves engine requests arriving on a host endpoint.
pub struct EngineDispatcher {
    factory: Arc<dyn EngineFactory>,
    gate: ModuleGate,
    slots: Arc<DashMap<Uuid, Arc<EngineSlot>>>,
}

impl EngineDispatcher {
    pub fn new(factory: Arc<dyn EngineFactory>, gate: ModuleGate) -> Self {
        Self {
            factory,
            gate,
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Start serving the endpoint. The task runs until the client half of
    /// the channel is dropped; a failing request never stops the loop.
    pub fn serve(self, endpoint: HostEndpoint) -> JoinHandle<()> {
        let (mut requests, responses) = endpoint.into_parts();
        tokio::spawn(async move {
            let dispatcher = Arc::new(self);
            while let Some(request) = requests.recv().await {
                let dispatcher = Arc::clone(&dispatcher);
                let responses = responses.clone();
                tokio::spawn(async move {
                    let response = dispatcher.answer(&request).await;
                    if responses.send(response).await.is_err() {
                        debug!(
                            request_id = %request.id,
                            "client went away before the response was delivered"
                        );
                    }
                });
            }
            debug!("engine dispatcher stopped: request channel closed");
        })
    }

    async fn answer(&self, request: &RequestEnvelope) -> ResponseEnvelope {
        debug!(
            request_id = %request.id,
            instance_id = ?request.instance_id,
            method = %request.method,
            "engine request received"
        );

        match self.apply(request).await {
            Ok(result) => ResponseEnvelope::success(request, result),
            Err(error) => {
                warn!(
                    request_id = %request.id,
                    method = %request.method,
                    error = %error,
                    "engine request failed"
                );
                ResponseEnvelope::failure(request, error.message)
            }
        }
    }

    async fn apply(&self, request: &RequestEnvelope) -> Result<Value, EngineError> {
        if request.method == methods::MODULE_READY {
            return self
                .gate
                .wait()
                .await
                .map(|_| Value::Null)
                .map_err(EngineError::new);
        }

        let key = instance_key(request);

        // Teardown never constructs a missing instance; it only releases an
        // existing one and reports how many are left.
        if request.method == methods::DESTROY {
            if let Some((_key, slot)) = self.slots.remove(&key) {
                let mut guard = slot.engine.lock().await;
                if let Some(engine) = guard.as_mut() {
                    engine.destroy();
                }
                *guard = None;
            }
            return Ok(json!(self.slots.len() as u64));
        }

        loop {
            let slot = self
                .slots
                .entry(key)
                .or_insert_with(EngineSlot::empty)
                .clone();

            let mut guard = slot.engine.lock().await;
            if guard.is_none() {
                self.gate.wait().await.map_err(EngineError::new)?;
                *guard = Some(self.factory.create().await?);

                // A concurrent teardown may have unmapped the slot while the
                // engine was being built. An engine stranded in an orphaned
                // slot would leak without `destroy`; release it and take a
                // fresh slot.
                let still_mapped = self
                    .slots
                    .get(&key)
                    .is_some_and(|entry| Arc::ptr_eq(entry.value(), &slot));
                if !still_mapped {
                    if let Some(engine) = guard.as_mut() {
                        engine.destroy();
                    }
                    *guard = None;
                    continue;
                }
            }

            return match guard.as_mut() {
                Some(engine) => apply_method(engine.as_mut(), request),
                None => Err(EngineError::new("engine slot empty after construction")),
            };
        }
    }
}

fn instance_key(request: &RequestEnvelope) -> Uuid {
    request.instance_id.unwrap_or(Uuid::nil())
}

fn apply_method(
    engine: &mut dyn NotationEngine,
    request: &RequestEnvelope,
) -> Result<Value, EngineError> {
    let method = request.method.as_str();
    let args = request.args.as_slice();

    match method {
        methods::SET_OPTIONS => {
            let options = match args.first() {
                Some(Value::Object(map)) => map,
                _ => return Err(EngineError::new("setOptions expects an options object")),
            };
            engine.set_options(options).map(|_| Value::Null)
        }
        methods::LOAD_DATA => {
            let data = match args.first() {
                Some(Value::String(text)) => text.as_bytes(),
                _ => return Err(EngineError::new("loadData expects the document text")),
            };
            engine.load_data(data).map(|_| Value::Null)
        }
        methods::REDO_LAYOUT => engine.redo_layout().map(|_| Value::Null),
        methods::RENDER_TO_SVG => {
            let page = match args.first().and_then(Value::as_u64) {
                Some(page) if page >= 1 => page as u32,
                _ => return Err(EngineError::new("renderToSVG expects a positive page number")),
            };
            engine.render_to_svg(page).map(Value::String)
        }
        methods::GET_PAGE_COUNT => engine.get_page_count().map(|count| json!(count)),
        methods::SELECT => {
            let filter = args.first().cloned().unwrap_or(Value::Null);
            engine.select(&filter).map(|applied| json!(applied))
        }
        other => match engine.invoke(other, args) {
            Some(outcome) => outcome,
            None => {
                // Tolerance for optional capabilities: an absent method is
                // a no-op with a null result, not a protocol error.
                debug!(method = other, "unknown engine method treated as no-op");
                Ok(Value::Null)
            }
        },
    }
}

/// Convenience wiring for in-process deployments: build a channel pair,
/// serve the host half with a dispatcher and hand back the connected
/// client endpoint sender/receiver halves untouched.
pub fn spawn_host(
    capacity: usize,
    factory: Arc<dyn EngineFactory>,
    gate: ModuleGate,
) -> (crate::infra::channel::ClientEndpoint, JoinHandle<()>) {
    let (client_end, host_end) = crate::infra::channel::pair(capacity);
    let task = EngineDispatcher::new(factory, gate).serve(host_end);
    (client_end, task)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Map;
    use tokio::sync::Notify;

    use super::*;
    use crate::infra::rpc::EngineClient;

    struct StubEngine {
        pages: u32,
        destroyed: Arc<AtomicUsize>,
    }

    impl NotationEngine for StubEngine {
        fn set_options(&mut self, _options: &Map<String, Value>) -> Result<(), EngineError> {
            Ok(())
        }

        fn load_data(&mut self, _data: &[u8]) -> Result<(), EngineError> {
            Ok(())
        }

        fn redo_layout(&mut self) -> Result<(), EngineError> {
            Ok(())
        }

        fn render_to_svg(&mut self, page: u32) -> Result<String, EngineError> {
            Ok(format!("<svg data-page=\"{page}\"/>"))
        }

        fn get_page_count(&mut self) -> Result<u32, EngineError> {
            Ok(self.pages)
        }

        fn select(&mut self, _filter: &Value) -> Result<bool, EngineError> {
            Ok(true)
        }

        fn destroy(&mut self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Factory whose first construction parks until released, so a test can
    /// interleave other requests with an in-flight build.
    struct GatedFactory {
        created: AtomicUsize,
        destroyed: Arc<AtomicUsize>,
        release_first: Arc<Notify>,
    }

    #[async_trait]
    impl EngineFactory for GatedFactory {
        async fn create(&self) -> Result<Box<dyn NotationEngine>, EngineError> {
            if self.created.fetch_add(1, Ordering::SeqCst) == 0 {
                self.release_first.notified().await;
            }
            Ok(Box::new(StubEngine {
                pages: 3,
                destroyed: Arc::clone(&self.destroyed),
            }))
        }
    }

    #[tokio::test]
    async fn destroy_during_construction_releases_the_stranded_engine() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let factory = Arc::new(GatedFactory {
            created: AtomicUsize::new(0),
            destroyed: Arc::clone(&destroyed),
            release_first: Arc::clone(&release),
        });
        let gate = ModuleGate::new();
        gate.signal_ready();

        let (endpoint, _host) = spawn_host(8, Arc::clone(&factory) as Arc<dyn EngineFactory>, gate);
        let client = Arc::new(EngineClient::connect(endpoint));

        let caller = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_page_count().await })
        };

        // Let the call reach the factory and park there.
        while factory.created.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let teardown = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.destroy().await })
        };
        // Give the teardown time to unmap the slot under construction.
        tokio::time::sleep(Duration::from_millis(20)).await;

        release.notify_one();

        let count = caller
            .await
            .expect("caller task")
            .expect("call served despite the race");
        assert_eq!(count, 3);
        teardown.await.expect("teardown task").expect("destroy answered");

        // The build that lost the race was released, and the call was served
        // by a second, reachable engine.
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }
}
