//! Background maintenance loops.
//!
//! Each loop is an independent task driven by a timer and the engine's
//! shutdown signal. Per-peer errors are swallowed (the next tick retries),
//! so one unreachable peer never stalls maintenance.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use astral_types::unix_now;

use crate::engine::{DhtEngine, Transport};
use crate::storage::Storage;

impl<T, S> DhtEngine<T, S>
where
    T: Transport + 'static,
    S: Storage + 'static,
{
    /// Spawn every maintenance loop. The handles finish when shutdown fires.
    pub fn spawn_maintenance(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_tick(self.config.announce_interval, "announce", |e| async move {
                e.announce_tick().await;
            }),
            self.spawn_tick(self.config.liveness_interval, "liveness", |e| async move {
                e.liveness_tick().await;
            }),
            self.spawn_tick(
                self.config.gossip_validation_interval,
                "gossip-validation",
                |e| async move {
                    e.gossip_validation_tick().await;
                },
            ),
            self.spawn_tick(self.config.cache_prune_interval, "prune", |e| async move {
                e.prune_tick().await;
            }),
            self.spawn_watchdog(),
        ]
    }

    fn spawn_tick<F, Fut>(
        self: &Arc<Self>,
        period: std::time::Duration,
        name: &'static str,
        tick: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let engine = Arc::clone(self);
        let mut shutdown = self.subscribe_shutdown();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!(loop_name = name, "Maintenance tick");
                        tick(Arc::clone(&engine)).await;
                    }
                    _ = shutdown.recv() => {
                        debug!(loop_name = name, "Maintenance loop stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Re-announce the local system to a random subset of known peers.
    async fn announce_tick(self: Arc<Self>) {
        let mut targets = {
            let cache = self.cache.read().await;
            let now = unix_now();
            let mut targets = cache.shareable(now);
            if targets.is_empty() {
                targets = cache.all_systems();
            }
            targets
        };
        {
            let mut rng = rand::thread_rng();
            targets.shuffle(&mut rng);
        }
        targets.truncate(self.config.k);

        for peer in targets {
            if let Err(e) = self.announce_to(&peer).await {
                debug!(system_id = %peer.id, error = %e, "Announce failed");
            }
        }
    }

    /// Ping Degraded and Stale peers; repeated failures escalate toward
    /// eviction by the prune sweep.
    async fn liveness_tick(self: Arc<Self>) {
        let candidates = self.cache.read().await.liveness_candidates(unix_now());
        for peer in candidates {
            match self.ping(&peer).await {
                Ok(_) => debug!(system_id = %peer.id, "Liveness probe succeeded"),
                Err(e) => debug!(system_id = %peer.id, error = %e, "Liveness probe failed"),
            }
        }
    }

    /// Verify Pending entries oldest-first by pinging them directly.
    async fn gossip_validation_tick(self: Arc<Self>) {
        let batch = self
            .cache
            .read()
            .await
            .pending_oldest(self.config.alpha * 2);
        for peer in batch {
            match self.ping(&peer).await {
                Ok(responder) => {
                    debug!(system_id = %responder.id, "Verified gossiped system")
                }
                Err(e) => debug!(system_id = %peer.id, error = %e, "Gossip verification failed"),
            }
        }
    }

    /// Drop evicted and aged-out entries, cache and storage both.
    async fn prune_tick(self: Arc<Self>) {
        let removed = self.cache.write().await.prune(unix_now());
        if removed.is_empty() {
            return;
        }
        info!(pruned = removed.len(), "Pruned routing cache");
        for id in removed {
            if let Err(e) = self.storage().delete_peer_system(&id) {
                warn!(system_id = %id, error = %e, "Failed to delete pruned peer");
            }
        }
    }

    /// Warn when no inbound request has been observed, the strongest signal
    /// that this node is not reachable from the overlay.
    fn spawn_watchdog(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut shutdown = self.subscribe_shutdown();
        let initial = self.config.watchdog_initial_delay;
        let period = self.config.watchdog_interval;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + initial, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let last = *engine.last_inbound.read().await;
                        match last {
                            None => warn!(
                                started_at = engine.started_at,
                                "No inbound DHT request observed since startup; the node may be unreachable"
                            ),
                            Some(at) => {
                                let silence = unix_now().saturating_sub(at);
                                if silence >= period.as_secs() {
                                    warn!(
                                        silent_secs = silence,
                                        "No recent inbound DHT requests; the node may be unreachable"
                                    );
                                }
                            }
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}
