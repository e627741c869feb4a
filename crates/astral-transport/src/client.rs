//! HTTP client: carries signed envelopes to peers.

use std::future::Future;
use std::time::Duration;

use astral_dht::bootstrap::FullSyncSnapshot;
use astral_dht::engine::Transport;
use astral_dht::messages::{DhtMessage, ErrorBody};
use astral_dht::{DhtError, Result};
use astral_types::System;

/// reqwest-backed transport.
///
/// The client-level timeout matches the engine's request timeout, so a hung
/// peer resolves as [`DhtError::Timeout`] rather than stalling the exchange
/// indefinitely.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DhtError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    async fn post_dht(&self, peer_address: &str, message: &DhtMessage) -> Result<DhtMessage> {
        let url = format!("http://{peer_address}/dht");
        let response = self
            .client
            .post(&url)
            .json(message)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if response.status().is_success() {
            response
                .json::<DhtMessage>()
                .await
                .map_err(|e| DhtError::Transport(format!("malformed reply: {e}")))
        } else {
            match response.json::<ErrorBody>().await {
                Ok(body) => Err(body.into_error()),
                Err(e) => Err(DhtError::Transport(format!("malformed error reply: {e}"))),
            }
        }
    }

    /// Fetch a peer's local system record.
    pub async fn fetch_system(&self, peer_address: &str) -> Result<System> {
        let url = format!("http://{peer_address}/system");
        self.client
            .get(&url)
            .send()
            .await
            .map_err(map_reqwest_error)?
            .json::<System>()
            .await
            .map_err(|e| DhtError::Transport(format!("malformed system record: {e}")))
    }

    /// Fetch a seed's bootstrap snapshot.
    pub async fn fetch_full_sync(&self, peer_address: &str) -> Result<FullSyncSnapshot> {
        let url = format!("http://{peer_address}/api/full-sync");
        self.client
            .get(&url)
            .send()
            .await
            .map_err(map_reqwest_error)?
            .json::<FullSyncSnapshot>()
            .await
            .map_err(|e| DhtError::Transport(format!("malformed snapshot: {e}")))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> DhtError {
    if e.is_timeout() {
        DhtError::Timeout
    } else {
        DhtError::Transport(e.to_string())
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        peer_address: &str,
        message: DhtMessage,
    ) -> impl Future<Output = Result<DhtMessage>> + Send {
        let this = self.clone();
        let peer_address = peer_address.to_string();
        async move { this.post_dht(&peer_address, &message).await }
    }
}
