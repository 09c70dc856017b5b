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

//! # Registry syncer
//!
//! The [RegistrySyncer] keeps the node's view of the capability registry in step with the authoritative registry
//! source. It owns the lifecycle described by [SyncerState]:
//!
//! 1. `start` fetches the initial snapshot (retrying with backoff), reconciles the capabilities registry and
//!    dispatcher against it, pushes the required peer set to the local peer and launches the refresh worker.
//! 2. The refresh worker repeats the fetch and reconciliation every `refresh_interval`. Failed refreshes keep the
//!    committed snapshot and are reported through [SyncerHealth] and [SyncerEvent]s.
//! 3. `close` stops the worker, waits for an in-flight reconciliation and removes the receivers the syncer
//!    installed on the dispatcher.
//!
//! At most one reconciliation is in flight at any time, and the committed snapshot is only replaced once a pass
//! has finished.

mod acquisition;
mod apply;
mod context;
mod worker;

mod error;
pub use error::{AcquisitionError, CallError, ConflictError, LifecycleError, RegistrationError};

mod event;
pub use event::{SyncerEvent, SyncerEventReceiver, SyncerEventSender, SyncerHealth};

mod reconcile;
pub use reconcile::{plan_reconciliation, Operation, ReconcilePlan, ReconcileReport};


use std::{collections::BTreeSet, fmt, sync::Arc};

use arc_swap::ArcSwap;
use log::*;
use tari_shutdown::{Shutdown, ShutdownSignal};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
    time::{self, Instant},
};

use self::{
    acquisition::fetch_initial_snapshot,
    context::{PassKind, SyncContext},
    worker::RefreshWorker,
};
use crate::{
    config::CapabilitiesConfig,
    dispatcher::Dispatcher,
    peer::{Peer, PeerWrapper},
    reader::RegistryReader,
    registry::CapabilitiesRegistry,
    types::RegistrySnapshot,
};

const LOG_TARGET: &str = "capabilities::syncer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncerState {
    /// Constructed, no collaborator has been called yet
    Created,
    /// `start` is running the initial acquisition and reconciliation
    Started,
    /// The refresh worker is running
    SteadyState,
    Closing,
    Closed,
}

impl fmt::Display for SyncerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncerState::Created => f.write_str("created"),
            SyncerState::Started => f.write_str("started"),
            SyncerState::SteadyState => f.write_str("in steady state"),
            SyncerState::Closing => f.write_str("closing"),
            SyncerState::Closed => f.write_str("closed"),
        }
    }
}

struct Lifecycle {
    state: SyncerState,
    worker: Option<JoinHandle<()>>,
    shutdown: Shutdown,
}

pub struct RegistrySyncer {
    context: Arc<SyncContext>,
    peer_wrapper: Arc<dyn PeerWrapper>,
    lifecycle: Mutex<Lifecycle>,
}

impl RegistrySyncer {
    pub fn new(
        config: CapabilitiesConfig,
        peer_wrapper: Arc<dyn PeerWrapper>,
        registry: Arc<dyn CapabilitiesRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
        reader: Arc<dyn RegistryReader>,
    ) -> Self {
        // A zero capacity is rejected by `start`, but the channel cannot be created with it
        let (event_tx, _) = broadcast::channel(config.event_channel_size.max(1));
        let (health, _) = watch::channel(SyncerHealth::Healthy);
        let context = SyncContext {
            config,
            reader,
            registry,
            dispatcher,
            committed: ArcSwap::from_pointee(RegistrySnapshot::empty()),
            subscriptions: Mutex::new(BTreeSet::new()),
            reconcile_lock: Mutex::new(()),
            closed: Mutex::new(false),
            health,
            event_tx,
        };
        Self {
            context: Arc::new(context),
            peer_wrapper,
            lifecycle: Mutex::new(Lifecycle {
                state: SyncerState::Created,
                worker: None,
                shutdown: Shutdown::new(),
            }),
        }
    }

    /// Performs the initial acquisition and reconciliation and launches the refresh worker.
    ///
    /// May only be called once. If this fails, the changes applied so far are reverted and the syncer is closed.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let shutdown_signal = {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.state != SyncerState::Created {
                return Err(LifecycleError::AlreadyStarted(lifecycle.state));
            }
            lifecycle.state = SyncerState::Started;
            lifecycle.shutdown.to_signal()
        };
        info!(target: LOG_TARGET, "Starting registry syncer");

        let peer = match self.initial_sync(shutdown_signal.clone()).await {
            Ok(peer) => peer,
            Err(err) => return self.abort_start(err).await,
        };

        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != SyncerState::Started {
            // `close` was called while starting and is responsible for cleaning up
            debug!(target: LOG_TARGET, "Syncer was closed while starting");
            return Err(LifecycleError::StartCancelled);
        }
        let worker = RefreshWorker::new(self.context.clone(), peer, shutdown_signal);
        lifecycle.worker = Some(worker.spawn());
        lifecycle.state = SyncerState::SteadyState;
        info!(
            target: LOG_TARGET,
            "Registry syncer started with snapshot version {} ({} capabilities)",
            self.context.committed.load().version(),
            self.context.committed.load().len()
        );
        Ok(())
    }

    async fn initial_sync(&self, mut shutdown_signal: ShutdownSignal) -> Result<Arc<dyn Peer>, LifecycleError> {
        self.context.config.validate()?;
        let peer = self.peer_wrapper.peer().ok_or(LifecycleError::PeerUnavailable)?;
        debug!(target: LOG_TARGET, "Local peer is {}", peer.id().short_str());

        let fetched = fetch_initial_snapshot(&*self.context.reader, &self.context.config, &mut shutdown_signal).await?;
        let report = self
            .context
            .run_pass(&*peer, fetched, &shutdown_signal, PassKind::Initial)
            .await?;
        if report.cancelled {
            return Err(LifecycleError::StartCancelled);
        }
        Ok(peer)
    }

    async fn abort_start(&self, err: LifecycleError) -> Result<(), LifecycleError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != SyncerState::Started {
            debug!(target: LOG_TARGET, "Syncer was closed while starting: {}", err);
            return Err(LifecycleError::StartCancelled);
        }
        error!(target: LOG_TARGET, "Failed to start registry syncer: {}", err);
        lifecycle.state = SyncerState::Closed;
        Err(err)
    }

    /// Stops the refresh worker and removes all receivers installed by this syncer.
    ///
    /// Closing an already closed (or closing) syncer is a no-op. If the worker or an in-flight reconciliation does
    /// not finish within `shutdown_timeout`, the worker is aborted, cleanup still runs, the syncer is closed and
    /// [LifecycleError::ShutdownTimeout] is returned.
    pub async fn close(&self) -> Result<(), LifecycleError> {
        let worker = {
            let mut lifecycle = self.lifecycle.lock().await;
            if matches!(lifecycle.state, SyncerState::Closing | SyncerState::Closed) {
                return Ok(());
            }
            lifecycle.state = SyncerState::Closing;
            lifecycle.shutdown.trigger();
            lifecycle.worker.take()
        };
        info!(target: LOG_TARGET, "Closing registry syncer");

        let timeout = self.context.config.shutdown_timeout;
        let deadline = Instant::now() + timeout;
        let mut timed_out = false;
        if let Some(mut worker) = worker {
            match time::timeout_at(deadline, &mut worker).await {
                Ok(Ok(())) => debug!(target: LOG_TARGET, "Refresh worker stopped"),
                Ok(Err(err)) => warn!(target: LOG_TARGET, "Refresh worker terminated abnormally: {}", err),
                Err(_) => {
                    warn!(
                        target: LOG_TARGET,
                        "Refresh worker did not stop within {:.2?}. Aborting it.", timeout
                    );
                    worker.abort();
                    timed_out = true;
                },
            }
        }

        // Waits for a pass started by `start` to observe the shutdown. Holding the lock keeps any further pass out.
        let guard = time::timeout_at(deadline, self.context.reconcile_lock.lock()).await.ok();
        if guard.is_none() {
            warn!(
                target: LOG_TARGET,
                "In-flight reconciliation did not finish within {:.2?}", timeout
            );
            timed_out = true;
        }
        // A pass that outlived the timeout sees this and discards its own work
        *self.context.closed.lock().await = true;
        self.context.remove_all_subscriptions().await;
        self.context.committed.store(Arc::new(RegistrySnapshot::empty()));
        drop(guard);

        self.lifecycle.lock().await.state = SyncerState::Closed;
        if timed_out {
            return Err(LifecycleError::ShutdownTimeout(timeout));
        }
        info!(target: LOG_TARGET, "Registry syncer closed");
        Ok(())
    }

    pub async fn state(&self) -> SyncerState {
        self.lifecycle.lock().await.state
    }

    /// The last committed snapshot. This is the empty snapshot before `start` and after `close`.
    pub fn committed_snapshot(&self) -> Arc<RegistrySnapshot> {
        self.context.committed.load_full()
    }

    pub fn health(&self) -> SyncerHealth {
        *self.context.health.borrow()
    }

    pub fn health_watch(&self) -> watch::Receiver<SyncerHealth> {
        self.context.health.subscribe()
    }

    pub fn get_event_subscription(&self) -> SyncerEventReceiver {
        self.context.event_tx.subscribe()
    }
}

impl fmt::Debug for RegistrySyncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySyncer")
            .field("config", &self.context.config)
            .field("committed_version", &self.context.committed.load().version())
            .field("health", &self.health())
            .finish()
    }
}
