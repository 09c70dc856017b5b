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

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::lock::Mutex;
use tokio::time;

use crate::{
    registry::{CapabilitiesRegistry, RegistryError},
    types::{CapabilityDescriptor, CapabilityId, ConfigDigest},
};

pub fn create_capabilities_registry_mock() -> (MockCapabilitiesRegistry, CapabilitiesRegistryMockState) {
    let state = CapabilitiesRegistryMockState::default();
    (MockCapabilitiesRegistry { state: state.clone() }, state)
}

#[derive(Debug, Clone, Default)]
pub struct CapabilitiesRegistryMockState {
    inner: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<String>,
    entries: BTreeMap<CapabilityId, CapabilityDescriptor>,
    /// Calls containing any of these patterns fail
    failing_adds: Vec<String>,
    failing_removes: Vec<String>,
    delay: Option<Duration>,
}

impl CapabilitiesRegistryMockState {
    pub async fn take_calls(&self) -> Vec<String> {
        self.with_state(|state| state.calls.drain(..).collect()).await
    }

    pub async fn count_calls_containing(&self, pat: &str) -> usize {
        self.with_state(|state| state.calls.iter().filter(|s| s.contains(pat)).count())
            .await
    }

    /// Names of the registered capabilities, in id order
    pub async fn names(&self) -> Vec<String> {
        self.with_state(|state| state.entries.keys().map(|id| id.name().to_string()).collect())
            .await
    }

    pub async fn entries(&self) -> Vec<(CapabilityId, ConfigDigest)> {
        self.with_state(|state| {
            state
                .entries
                .iter()
                .map(|(id, d)| (id.clone(), *d.config_digest()))
                .collect()
        })
        .await
    }

    pub async fn digest_of(&self, name: &str) -> Option<ConfigDigest> {
        self.with_state(|state| {
            state
                .entries
                .values()
                .find(|d| d.id().name() == name)
                .map(|d| *d.config_digest())
        })
        .await
    }

    /// Every `add` call whose call string contains `pat` fails
    pub async fn fail_add(&self, pat: &str) {
        self.with_state(|state| state.failing_adds.push(pat.to_string())).await
    }

    pub async fn fail_remove(&self, pat: &str) {
        self.with_state(|state| state.failing_removes.push(pat.to_string())).await
    }

    pub async fn clear_failures(&self) {
        self.with_state(|state| {
            state.failing_adds.clear();
            state.failing_removes.clear();
        })
        .await
    }

    pub async fn set_delay(&self, delay: Duration) {
        self.with_state(|state| {
            state.delay = Some(delay);
        })
        .await
    }

    async fn delay(&self) {
        let delay = self.with_state(|state| state.delay).await;
        if let Some(delay) = delay {
            time::sleep(delay).await;
        }
    }

    async fn with_state<F, R>(&self, f: F) -> R
    where F: FnOnce(&mut State) -> R {
        let mut lock = self.inner.lock().await;
        (f)(&mut *lock)
    }
}

#[derive(Debug, Clone)]
pub struct MockCapabilitiesRegistry {
    state: CapabilitiesRegistryMockState,
}

#[async_trait]
impl CapabilitiesRegistry for MockCapabilitiesRegistry {
    async fn add(&self, descriptor: CapabilityDescriptor) -> Result<(), RegistryError> {
        self.state.delay().await;
        self.state
            .with_state(|state| {
                let call = format!("add({}, {})", descriptor.id(), descriptor.config_digest());
                let fail = state.failing_adds.iter().any(|pat| call.contains(pat.as_str()));
                state.calls.push(call);
                if fail {
                    return Err(RegistryError::Unavailable("add failed".to_string()));
                }
                if state.entries.contains_key(descriptor.id()) {
                    return Err(RegistryError::DuplicateCapability(descriptor.id().clone()));
                }
                state.entries.insert(descriptor.id().clone(), descriptor);
                Ok(())
            })
            .await
    }

    async fn remove(&self, id: &CapabilityId) -> Result<(), RegistryError> {
        self.state.delay().await;
        self.state
            .with_state(|state| {
                let call = format!("remove({})", id);
                let fail = state.failing_removes.iter().any(|pat| call.contains(pat.as_str()));
                state.calls.push(call);
                if fail {
                    return Err(RegistryError::Unavailable("remove failed".to_string()));
                }
                state
                    .entries
                    .remove(id)
                    .map(|_| ())
                    .ok_or_else(|| RegistryError::CapabilityNotFound(id.clone()))
            })
            .await
    }
}
