//! Calling side of the engine channel.
//!
//! Every invocation records a pending call keyed by a fresh correlation id,
//! sends the request envelope and awaits the matching response. Outstanding
//! calls are independent: any number may be in flight at once and they
//! settle strictly by id, regardless of completion order on the remote side.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use serde_json::{Map, Value, json};
use spartito_protocol::{RequestEnvelope, ResponseEnvelope, methods};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::debug;
use uuid::Uuid;

use super::RpcError;
use crate::infra::channel::ClientEndpoint;

type PendingCall = oneshot::Sender<Result<Value, RpcError>>;

/// Shared between every instance handle on one channel: the request sender,
/// the outstanding-call table and the response pump.
struct ClientCore {
    requests: mpsc::Sender<RequestEnvelope>,
    pending: Arc<DashMap<Uuid, PendingCall>>,
    pump: JoinHandle<()>,
}

impl Drop for ClientCore {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Call-through handle addressing one logical engine instance.
///
/// Created with [`EngineClient::connect`]; additional instances sharing the
/// same channel come from [`EngineClient::another_instance`]. No timeout is
/// imposed here: a call whose response never arrives stays pending, and any
/// timeout policy belongs to the orchestration layer.
pub struct EngineClient {
    core: Arc<ClientCore>,
    instance_id: Uuid,
}

impl EngineClient {
    /// Attach to the client half of an engine channel and start the
    /// response pump.
    pub fn connect(endpoint: ClientEndpoint) -> Self {
        let pending: Arc<DashMap<Uuid, PendingCall>> = Arc::new(DashMap::new());
        let table = Arc::clone(&pending);
        let mut responses = endpoint.responses;

        let pump = tokio::spawn(async move {
            while let Some(response) = responses.recv().await {
                settle(&table, response);
            }
            // Host is gone: reject every still-pending call so waiters do
            // not hang on a channel that can never answer.
            table.retain(|_, _| false);
            debug!("engine response pump stopped, pending calls rejected");
        });

        Self {
            core: Arc::new(ClientCore {
                requests: endpoint.requests,
                pending,
                pump,
            }),
            instance_id: Uuid::new_v4(),
        }
    }

    /// A new logical engine instance multiplexed over the same channel.
    pub fn another_instance(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Invoke a named engine method with positional arguments.
    ///
    /// This is the escape hatch behind every typed wrapper; it exists as a
    /// public surface so callers can reach engine capabilities the typed
    /// interface does not enumerate.
    pub async fn invoke(
        &self,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let request = RequestEnvelope::new(Some(self.instance_id), method, args);
        let id = request.id;

        let (settled_tx, settled_rx) = oneshot::channel();
        self.core.pending.insert(id, settled_tx);
        counter!("spartito_rpc_request_total").increment(1);

        if self.core.requests.send(request).await.is_err() {
            self.core.pending.remove(&id);
            return Err(RpcError::ChannelClosed);
        }

        match settled_rx.await {
            Ok(outcome) => outcome,
            Err(_) => {
                // Pump rejected the table wholesale because the host closed.
                self.core.pending.remove(&id);
                Err(RpcError::ChannelClosed)
            }
        }
    }

    /// Resolved once the engine module finished its asynchronous startup.
    pub async fn module_ready(&self) -> Result<(), RpcError> {
        self.invoke(methods::MODULE_READY, Vec::new()).await.map(|_| ())
    }

    pub async fn set_options(&self, options: &Map<String, Value>) -> Result<(), RpcError> {
        self.invoke(methods::SET_OPTIONS, vec![Value::Object(options.clone())])
            .await
            .map(|_| ())
    }

    /// Hand document bytes to the engine. The envelope carries the document
    /// as text; non-UTF-8 input fails with [`RpcError::NonTextPayload`]
    /// before any request is sent.
    pub async fn load_data(&self, data: &[u8]) -> Result<(), RpcError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| RpcError::NonTextPayload)?
            .to_owned();
        self.invoke(methods::LOAD_DATA, vec![Value::String(text)])
            .await
            .map(|_| ())
    }

    pub async fn redo_layout(&self) -> Result<(), RpcError> {
        self.invoke(methods::REDO_LAYOUT, Vec::new()).await.map(|_| ())
    }

    pub async fn render_to_svg(&self, page: u32) -> Result<String, RpcError> {
        let result = self.invoke(methods::RENDER_TO_SVG, vec![json!(page)]).await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or(RpcError::UnexpectedResult {
                method: methods::RENDER_TO_SVG,
            })
    }

    pub async fn get_page_count(&self) -> Result<u32, RpcError> {
        let result = self.invoke(methods::GET_PAGE_COUNT, Vec::new()).await?;
        result
            .as_u64()
            .map(|count| count as u32)
            .ok_or(RpcError::UnexpectedResult {
                method: methods::GET_PAGE_COUNT,
            })
    }

    /// Apply an element-selection filter. Engines without the capability
    /// answer null, reported here as `false`.
    pub async fn select(&self, filter: &Value) -> Result<bool, RpcError> {
        let result = self.invoke(methods::SELECT, vec![filter.clone()]).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Tear down this logical instance host-side, returning the number of
    /// instances still alive on the channel.
    pub async fn destroy(&self) -> Result<u64, RpcError> {
        let result = self.invoke(methods::DESTROY, Vec::new()).await?;
        result.as_u64().ok_or(RpcError::UnexpectedResult {
            method: methods::DESTROY,
        })
    }
}

fn settle(table: &DashMap<Uuid, PendingCall>, response: ResponseEnvelope) {
    match table.remove(&response.id) {
        Some((_id, pending)) => {
            let outcome = match response.error {
                Some(message) => Err(RpcError::Engine { message }),
                None => Ok(response.result),
            };
            // The caller may have given up waiting; a dropped receiver is
            // not an error.
            let _ = pending.send(outcome);
        }
        None => {
            // Late or duplicate delivery after teardown: protocol says drop
            // it without complaint.
            counter!("spartito_rpc_orphan_response_total").increment(1);
            debug!(
                response_id = %response.id,
                method = %response.method,
                "dropped response with no pending call"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::channel;

    #[tokio::test]
    async fn call_resolves_from_matching_response() {
        let (client_end, host) = channel::pair(4);
        let (mut requests, responses) = host.into_parts();
        let client = EngineClient::connect(client_end);

        tokio::spawn(async move {
            let request = requests.recv().await.expect("request");
            responses
                .send(ResponseEnvelope::success(&request, json!(12)))
                .await
                .expect("response sent");
        });

        assert_eq!(client.get_page_count().await.expect("count"), 12);
        assert!(client.core.pending.is_empty());
    }

    #[tokio::test]
    async fn engine_error_rejects_only_its_own_call() {
        let (client_end, host) = channel::pair(4);
        let (mut requests, responses) = host.into_parts();
        let client = EngineClient::connect(client_end);

        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let response = if request.method == methods::REDO_LAYOUT {
                    ResponseEnvelope::failure(&request, "layout exploded")
                } else {
                    ResponseEnvelope::success(&request, json!(3))
                };
                responses.send(response).await.expect("response sent");
            }
        });

        let failed = client.redo_layout().await.expect_err("failure propagated");
        assert!(matches!(failed, RpcError::Engine { .. }));
        assert_eq!(client.get_page_count().await.expect("count"), 3);
    }

    #[tokio::test]
    async fn reversed_response_order_settles_each_call_with_its_own_result() {
        let (client_end, host) = channel::pair(4);
        let (mut requests, responses) = host.into_parts();
        let client = EngineClient::connect(client_end);

        tokio::spawn(async move {
            let first = requests.recv().await.expect("first request");
            let second = requests.recv().await.expect("second request");
            // Complete the later call first.
            for request in [&second, &first] {
                let page = request.args[0].as_u64().expect("page argument");
                responses
                    .send(ResponseEnvelope::success(
                        request,
                        json!(format!("<svg data-page=\"{page}\"/>")),
                    ))
                    .await
                    .expect("response sent");
            }
        });

        let (one, two) = tokio::join!(client.render_to_svg(1), client.render_to_svg(2));
        assert_eq!(one.expect("first call"), "<svg data-page=\"1\"/>");
        assert_eq!(two.expect("second call"), "<svg data-page=\"2\"/>");
        assert!(client.core.pending.is_empty());
    }

    #[tokio::test]
    async fn orphan_response_is_dropped_without_side_effects() {
        let (client_end, host) = channel::pair(4);
        let (mut requests, responses) = host.into_parts();
        let client = EngineClient::connect(client_end);

        tokio::spawn(async move {
            // An unsolicited response nobody asked for, then the real answer.
            let stray = RequestEnvelope::new(None, methods::GET_PAGE_COUNT, Vec::new());
            responses
                .send(ResponseEnvelope::success(&stray, json!(999)))
                .await
                .expect("stray sent");

            let request = requests.recv().await.expect("request");
            responses
                .send(ResponseEnvelope::success(&request, json!(7)))
                .await
                .expect("response sent");
        });

        assert_eq!(client.get_page_count().await.expect("count"), 7);
        assert!(client.core.pending.is_empty());
    }

    #[tokio::test]
    async fn binary_document_is_rejected_before_sending() {
        let (client_end, host) = channel::pair(4);
        let (mut requests, _responses) = host.into_parts();
        let client = EngineClient::connect(client_end);

        let err = client
            .load_data(&[0xff, 0xfe, 0x00, 0x01])
            .await
            .expect_err("binary payload rejected");
        assert!(matches!(err, RpcError::NonTextPayload));

        // Nothing crossed the channel and nothing is left pending.
        assert!(requests.try_recv().is_err());
        assert!(client.core.pending.is_empty());
    }

    #[tokio::test]
    async fn closed_host_rejects_pending_calls() {
        let (client_end, host) = channel::pair(4);
        let client = EngineClient::connect(client_end);
        drop(host);

        let err = client.redo_layout().await.expect_err("channel closed");
        assert!(matches!(err, RpcError::ChannelClosed));
    }
}
