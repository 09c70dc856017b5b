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

use std::time::Duration;

use thiserror::Error;

use super::SyncerState;
use crate::{
    config::ConfigurationError,
    dispatcher::DispatcherError,
    peer::PeerError,
    reader::ReaderError,
    registry::RegistryError,
    types::{CapabilityId, ConfigDigest, SubscriptionKey},
};

/// Outcome of a deadline-bounded call to a collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError<E>
where E: std::error::Error + 'static
{
    #[error("{0}")]
    Failed(E),
    #[error("Call timed out after {0:.2?}")]
    Timeout(Duration),
}

/// A registry snapshot could not be acquired. At start-up these are retried, on refresh they are logged and skipped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("Registry reader error: {0}")]
    Reader(#[from] ReaderError),
    #[error("Fetching the registry snapshot timed out after {0:.2?}")]
    Timeout(Duration),
    #[error("Fetched snapshot version {fetched} is older than the committed version {committed}")]
    Stale { fetched: u64, committed: u64 },
    #[error("Snapshot acquisition was cancelled")]
    Cancelled,
}

impl From<CallError<ReaderError>> for AcquisitionError {
    fn from(err: CallError<ReaderError>) -> Self {
        match err {
            CallError::Failed(err) => AcquisitionError::Reader(err),
            CallError::Timeout(timeout) => AcquisitionError::Timeout(timeout),
        }
    }
}

/// The fetched snapshot declares the same capability more than once with different configurations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Snapshot declares capability `{id}` with {} different configuration digests", .digests.len())]
pub struct ConflictError {
    pub id: CapabilityId,
    pub digests: Vec<ConfigDigest>,
}

/// The capabilities registry or dispatcher rejected the change for a single descriptor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Capabilities registry rejected `{id}`: {source}")]
    Registry {
        id: CapabilityId,
        source: CallError<RegistryError>,
    },
    #[error("Dispatcher rejected the receiver for {key}: {source}")]
    Dispatcher {
        key: SubscriptionKey,
        source: CallError<DispatcherError>,
    },
}

impl RegistrationError {
    pub fn capability_id(&self) -> &CapabilityId {
        match self {
            RegistrationError::Registry { id, .. } => id,
            RegistrationError::Dispatcher { key, .. } => &key.capability,
        }
    }
}

/// Errors that are fatal to bringing up or shutting down the syncer
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Start was called on a syncer that is {0}")]
    AlreadyStarted(SyncerState),
    #[error(transparent)]
    InvalidConfig(#[from] ConfigurationError),
    #[error("The local peer is not available")]
    PeerUnavailable,
    #[error("Failed to fetch the initial registry snapshot after {attempts} attempt(s): {last_error}")]
    InitialFetchExhausted {
        attempts: usize,
        last_error: AcquisitionError,
    },
    #[error("Failed to establish the initial peer connections: {0}")]
    InitialPeerUpdate(CallError<PeerError>),
    #[error("Start was cancelled because the syncer is closing")]
    StartCancelled,
    #[error("Syncer did not shut down within {0:.2?}")]
    ShutdownTimeout(Duration),
}
