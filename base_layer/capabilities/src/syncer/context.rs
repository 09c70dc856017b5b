//  Copyright 2024, The Tari Project
//
//  Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
//  following conditions are met:
//
//  1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
//  disclaimer.
//
//  2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
//  following disclaimer in the documentation and/or other materials provided with the distribution.
//
//  3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
//  products derived from this software without specific prior written permission.
//
//  THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
//  INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
//  DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
//  SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
//  SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
//  WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
//  USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::{collections::BTreeSet, sync::Arc};

use arc_swap::ArcSwap;
use log::*;
use tari_shutdown::ShutdownSignal;
use tokio::sync::{watch, Mutex};

use super::{
    acquisition::with_deadline,
    apply::Applier,
    error::{LifecycleError, RegistrationError},
    event::{SyncerEvent, SyncerEventSender, SyncerHealth},
    reconcile::{plan_reconciliation, ReconcileReport},
};
use crate::{
    config::CapabilitiesConfig,
    dispatcher::Dispatcher,
    peer::Peer,
    reader::RegistryReader,
    registry::CapabilitiesRegistry,
    types::{CapabilityDescriptor, CapabilityId, RegistrySnapshot, SubscriptionKey},
};

const LOG_TARGET: &str = "capabilities::syncer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PassKind {
    /// The first pass, run inside `start`. A failed peer update is fatal.
    Initial,
    Refresh,
}

/// State shared between the syncer handle and its refresh worker
pub(super) struct SyncContext {
    pub config: CapabilitiesConfig,
    pub reader: Arc<dyn RegistryReader>,
    pub registry: Arc<dyn CapabilitiesRegistry>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub committed: ArcSwap<RegistrySnapshot>,
    /// Receivers this syncer has installed on the dispatcher
    pub subscriptions: Mutex<BTreeSet<SubscriptionKey>>,
    /// Held for the duration of a reconciliation pass
    pub reconcile_lock: Mutex<()>,
    /// Set by `close` before it cleans up. Passes commit while holding this lock, so nothing is committed after
    /// the cleanup.
    pub closed: Mutex<bool>,
    pub health: watch::Sender<SyncerHealth>,
    pub event_tx: SyncerEventSender,
}

impl SyncContext {
    /// Reconciles the committed snapshot with `fetched`, pushes the resulting peer set and commits.
    pub async fn run_pass(
        &self,
        peer: &dyn Peer,
        fetched: RegistrySnapshot,
        shutdown_signal: &ShutdownSignal,
        kind: PassKind,
    ) -> Result<ReconcileReport, LifecycleError> {
        let _guard = self.reconcile_lock.lock().await;
        let committed = self.committed.load_full();
        let plan = plan_reconciliation(&committed, &fetched);
        for conflict in plan.conflicts() {
            warn!(target: LOG_TARGET, "Skipping capability: {}", conflict);
        }
        for rejected in plan.rejected() {
            warn!(target: LOG_TARGET, "Skipping capability: {}", rejected);
        }
        debug!(
            target: LOG_TARGET,
            "Reconciling snapshot version {} -> {}: {} operation(s)",
            committed.version(),
            plan.version(),
            plan.operations().len()
        );

        let (active, mut report) = Applier::new(self, &committed, shutdown_signal.clone())
            .apply(plan)
            .await;
        let next = RegistrySnapshot::new(fetched.version(), active.into_values().collect());

        if !report.cancelled {
            let peers = next.peer_set(&peer.id());
            let num_peers = peers.len();
            match with_deadline(self.config.call_timeout, peer.update_connections(peers)).await {
                Ok(()) => {
                    trace!(target: LOG_TARGET, "Updated required peer connections ({} peer(s))", num_peers);
                },
                Err(err) if kind == PassKind::Initial => {
                    error!(
                        target: LOG_TARGET,
                        "Failed to update peer connections during start-up: {}. Reverting applied changes.", err
                    );
                    self.unwind(&next).await;
                    return Err(LifecycleError::InitialPeerUpdate(err));
                },
                Err(err) => {
                    warn!(
                        target: LOG_TARGET,
                        "Failed to update peer connections: {}. Will retry on the next refresh.", err
                    );
                    report.peer_update_failed = true;
                },
            }
        }

        let closed = self.closed.lock().await;
        if *closed {
            drop(closed);
            warn!(
                target: LOG_TARGET,
                "Syncer closed during reconciliation. Discarding snapshot version {} and removing its receivers.",
                next.version()
            );
            self.remove_all_subscriptions().await;
            report.cancelled = true;
            return Ok(report);
        }
        self.committed.store(Arc::new(next));
        drop(closed);

        if report.has_changes() || !report.is_clean() {
            info!(target: LOG_TARGET, "Committed registry snapshot {}", report);
        } else {
            debug!(target: LOG_TARGET, "Committed registry snapshot {}", report);
        }
        self.publish_event(SyncerEvent::SnapshotCommitted(report.clone()));
        Ok(report)
    }

    /// Best-effort removal of every receiver installed by this syncer
    pub async fn remove_all_subscriptions(&self) {
        let mut subscriptions = self.subscriptions.lock().await;
        let keys = std::mem::take(&mut *subscriptions);
        drop(subscriptions);
        for key in keys {
            let result = with_deadline(
                self.config.call_timeout,
                self.dispatcher.remove_receiver(&key.group, &key.capability),
            )
            .await;
            match result {
                Ok(()) => debug!(target: LOG_TARGET, "Removed receiver for {}", key),
                Err(err) => warn!(target: LOG_TARGET, "Failed to remove receiver for {}: {}", key, err),
            }
        }
    }

    /// Reverts the given applied state: removes every receiver and registry entry. Used when start-up fails after
    /// changes were applied.
    async fn unwind(&self, applied: &RegistrySnapshot) {
        self.remove_all_subscriptions().await;
        for descriptor in applied.iter() {
            if let Err(err) = self.registry_remove(descriptor.id()).await {
                warn!(target: LOG_TARGET, "Failed to remove `{}` while unwinding: {}", descriptor.id(), err);
            }
        }
    }

    /// Updates the current health. Watchers and event subscribers are only notified when the syncer moves between
    /// healthy and degraded.
    pub fn set_health(&self, health: SyncerHealth) {
        let transitioned = self.health.send_if_modified(|current| {
            let transitioned = current.is_healthy() != health.is_healthy();
            *current = health;
            transitioned
        });
        if transitioned {
            self.publish_event(SyncerEvent::HealthChanged(health));
        }
    }

    pub fn publish_event(&self, event: SyncerEvent) {
        // No subscribers is not an error
        let _size = self.event_tx.send(Arc::new(event));
    }

    pub async fn registry_add(&self, descriptor: CapabilityDescriptor) -> Result<(), RegistrationError> {
        let id = descriptor.id().clone();
        with_deadline(self.config.call_timeout, self.registry.add(descriptor))
            .await
            .map_err(|source| RegistrationError::Registry { id, source })
    }

    pub async fn registry_remove(&self, id: &CapabilityId) -> Result<(), RegistrationError> {
        with_deadline(self.config.call_timeout, self.registry.remove(id))
            .await
            .map_err(|source| RegistrationError::Registry { id: id.clone(), source })
    }

    /// Installs the descriptor's receiver on the dispatcher. Remotely routed descriptors have no receiver.
    pub async fn install_receiver(&self, descriptor: &CapabilityDescriptor) -> Result<(), RegistrationError> {
        let (key, receiver) = match (descriptor.subscription_key(), descriptor.receiver()) {
            (Some(key), Some(receiver)) => (key, receiver),
            _ => return Ok(()),
        };
        with_deadline(
            self.config.call_timeout,
            self.dispatcher.set_receiver(&key.group, &key.capability, receiver),
        )
        .await
        .map_err(|source| RegistrationError::Dispatcher {
            key: key.clone(),
            source,
        })?;
        self.subscriptions.lock().await.insert(key);
        Ok(())
    }

    pub async fn uninstall_receiver(&self, descriptor: &CapabilityDescriptor) -> Result<(), RegistrationError> {
        let key = match descriptor.subscription_key() {
            Some(key) => key,
            None => return Ok(()),
        };
        if !self.subscriptions.lock().await.contains(&key) {
            trace!(target: LOG_TARGET, "No receiver installed for {}", key);
            return Ok(());
        }
        with_deadline(
            self.config.call_timeout,
            self.dispatcher.remove_receiver(&key.group, &key.capability),
        )
        .await
        .map_err(|source| RegistrationError::Dispatcher {
            key: key.clone(),
            source,
        })?;
        self.subscriptions.lock().await.remove(&key);
        Ok(())
    }
}
