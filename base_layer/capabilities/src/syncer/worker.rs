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

use std::sync::Arc;

use log::*;
use tari_shutdown::ShutdownSignal;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use super::{
    acquisition::fetch_snapshot,
    context::{PassKind, SyncContext},
    error::AcquisitionError,
    event::{SyncerEvent, SyncerHealth},
};
use crate::peer::Peer;

const LOG_TARGET: &str = "capabilities::syncer::worker";

/// Background task that periodically fetches the registry snapshot and reconciles against it.
pub(super) struct RefreshWorker {
    context: Arc<SyncContext>,
    peer: Arc<dyn Peer>,
    shutdown_signal: ShutdownSignal,
    consecutive_failures: usize,
}

impl RefreshWorker {
    pub fn new(context: Arc<SyncContext>, peer: Arc<dyn Peer>, shutdown_signal: ShutdownSignal) -> Self {
        Self {
            context,
            peer,
            shutdown_signal,
            consecutive_failures: 0,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let interval = self.context.config.refresh_interval;
        let mut shutdown_signal = self.shutdown_signal.clone();
        // The initial pass already ran in `start`, so the first refresh is one interval away
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(
            target: LOG_TARGET,
            "Refresh worker started (interval = {:.2?})", interval
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown_signal.wait() => {
                    info!(target: LOG_TARGET, "Refresh worker is shutting down because the shutdown signal was received");
                    break;
                },

                _ = ticker.tick() => {
                    self.refresh().await;
                },
            }
        }
    }

    async fn refresh(&mut self) {
        trace!(target: LOG_TARGET, "Refreshing registry snapshot");
        let fetched = match fetch_snapshot(
            &*self.context.reader,
            self.context.config.call_timeout,
            &mut self.shutdown_signal,
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(AcquisitionError::Cancelled) => {
                debug!(target: LOG_TARGET, "Refresh cancelled");
                return;
            },
            Err(err) => {
                self.record_failure(err);
                return;
            },
        };

        let committed = self.context.committed.load().version();
        if fetched.version() < committed {
            self.record_failure(AcquisitionError::Stale {
                fetched: fetched.version(),
                committed,
            });
            return;
        }

        match self
            .context
            .run_pass(&*self.peer, fetched, &self.shutdown_signal, PassKind::Refresh)
            .await
        {
            Ok(report) if report.cancelled => {
                debug!(target: LOG_TARGET, "Refresh pass was cancelled: {}", report);
            },
            Ok(_) => self.record_success(),
            Err(err) => {
                // Refresh passes report per-descriptor problems in the report, so this is not expected
                error!(target: LOG_TARGET, "Refresh pass failed: {}", err);
            },
        }
    }

    fn record_failure(&mut self, err: AcquisitionError) {
        self.consecutive_failures += 1;
        warn!(
            target: LOG_TARGET,
            "Registry refresh failed ({} consecutive failure(s)): {}. Keeping the committed snapshot.",
            self.consecutive_failures,
            err
        );
        self.context.publish_event(SyncerEvent::RefreshFailed {
            consecutive_failures: self.consecutive_failures,
            error: err,
        });
        if self.consecutive_failures >= self.context.config.soft_failure_threshold {
            self.context.set_health(SyncerHealth::Degraded {
                consecutive_failures: self.consecutive_failures,
            });
        }
    }

    fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            info!(
                target: LOG_TARGET,
                "Registry refresh recovered after {} failure(s)", self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.context.set_health(SyncerHealth::Healthy);
    }
}
