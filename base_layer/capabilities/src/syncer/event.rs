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

use std::{fmt, sync::Arc};

use tokio::sync::broadcast;

use super::{error::AcquisitionError, reconcile::ReconcileReport};

pub type SyncerEventSender = broadcast::Sender<Arc<SyncerEvent>>;
pub type SyncerEventReceiver = broadcast::Receiver<Arc<SyncerEvent>>;

/// Health of the periodic refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncerHealth {
    Healthy,
    /// The last `consecutive_failures` refreshes failed. The committed snapshot is still served.
    Degraded { consecutive_failures: usize },
}

impl SyncerHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, SyncerHealth::Healthy)
    }
}

impl fmt::Display for SyncerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncerHealth::Healthy => f.write_str("healthy"),
            SyncerHealth::Degraded { consecutive_failures } => {
                write!(f, "degraded ({} consecutive refresh failure(s))", consecutive_failures)
            },
        }
    }
}

#[derive(Debug)]
pub enum SyncerEvent {
    /// A reconciliation pass finished and its result was committed
    SnapshotCommitted(ReconcileReport),
    /// A periodic refresh could not acquire a snapshot
    RefreshFailed {
        consecutive_failures: usize,
        error: AcquisitionError,
    },
    HealthChanged(SyncerHealth),
}

impl fmt::Display for SyncerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncerEvent::SnapshotCommitted(report) => write!(f, "SnapshotCommitted({})", report),
            SyncerEvent::RefreshFailed {
                consecutive_failures,
                error,
            } => write!(f, "RefreshFailed({}, {})", consecutive_failures, error),
            SyncerEvent::HealthChanged(health) => write!(f, "HealthChanged({})", health),
        }
    }
}
