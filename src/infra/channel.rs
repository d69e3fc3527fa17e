//! Duplex engine transport.
//!
//! One side sends tagged requests and receives tagged responses; the other
//! side is the mirror image. The in-process pair built here is backed by two
//! bounded mpsc queues and stands in for a worker message port: an isolated
//! deployment replaces the pump with real IPC carrying the same serde
//! envelopes from `spartito-protocol`.

use spartito_protocol::{RequestEnvelope, ResponseEnvelope};
use tokio::sync::mpsc;

/// Client half: requests out, responses in.
pub struct ClientEndpoint {
    pub(crate) requests: mpsc::Sender<RequestEnvelope>,
    pub(crate) responses: mpsc::Receiver<ResponseEnvelope>,
}

/// Host half: requests in, responses out.
pub struct HostEndpoint {
    pub(crate) requests: mpsc::Receiver<RequestEnvelope>,
    pub(crate) responses: mpsc::Sender<ResponseEnvelope>,
}

impl HostEndpoint {
    pub(crate) fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<RequestEnvelope>,
        mpsc::Sender<ResponseEnvelope>,
    ) {
        (self.requests, self.responses)
    }
}

/// Build a connected in-process endpoint pair.
///
/// `capacity` bounds each direction independently; a full queue applies
/// backpressure to the sender rather than dropping envelopes.
pub fn pair(capacity: usize) -> (ClientEndpoint, HostEndpoint) {
    let (request_tx, request_rx) = mpsc::channel(capacity);
    let (response_tx, response_rx) = mpsc::channel(capacity);

    (
        ClientEndpoint {
            requests: request_tx,
            responses: response_rx,
        },
        HostEndpoint {
            requests: request_rx,
            responses: response_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn envelopes_cross_the_pair_in_order() {
        let (client, host) = pair(4);
        let (mut host_requests, host_responses) = host.into_parts();

        let first = RequestEnvelope::new(None, "getPageCount", Vec::new());
        let second = RequestEnvelope::new(None, "renderToSVG", vec![json!(1)]);
        client.requests.send(first.clone()).await.expect("send first");
        client.requests.send(second.clone()).await.expect("send second");

        let received = host_requests.recv().await.expect("first request");
        assert_eq!(received.id, first.id);
        let received = host_requests.recv().await.expect("second request");
        assert_eq!(received.id, second.id);

        host_responses
            .send(ResponseEnvelope::success(&second, json!(5)))
            .await
            .expect("send response");

        let mut responses = client.responses;
        let answer = responses.recv().await.expect("response");
        assert_eq!(answer.id, second.id);
        assert_eq!(answer.result, json!(5));
    }
}
