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

use async_trait::async_trait;
use futures::lock::Mutex;

use crate::{
    dispatcher::{Dispatcher, DispatcherError, MessageReceiver},
    types::{CapabilityId, NetworkGroupId, SubscriptionKey},
};

pub fn create_dispatcher_mock() -> (MockDispatcher, DispatcherMockState) {
    let state = DispatcherMockState::default();
    (MockDispatcher { state: state.clone() }, state)
}

#[derive(Debug, Clone, Default)]
pub struct DispatcherMockState {
    inner: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<String>,
    installed: BTreeSet<SubscriptionKey>,
    /// Number of times a receiver was set for a key that already had one
    double_installs: usize,
    failing_sets: BTreeSet<String>,
    failing_removes: BTreeSet<String>,
}

impl DispatcherMockState {
    pub async fn take_calls(&self) -> Vec<String> {
        self.with_state(|state| state.calls.drain(..).collect()).await
    }

    pub async fn count_calls_containing(&self, pat: &str) -> usize {
        self.with_state(|state| state.calls.iter().filter(|s| s.contains(pat)).count())
            .await
    }

    pub async fn installed(&self) -> BTreeSet<SubscriptionKey> {
        self.with_state(|state| state.installed.clone()).await
    }

    /// Capability names with an installed receiver, in key order
    pub async fn installed_names(&self) -> Vec<String> {
        self.with_state(|state| {
            state
                .installed
                .iter()
                .map(|key| key.capability.name().to_string())
                .collect()
        })
        .await
    }

    pub async fn double_installs(&self) -> usize {
        self.with_state(|state| state.double_installs).await
    }

    pub async fn fail_set_receiver(&self, name: &str) {
        self.with_state(|state| {
            state.failing_sets.insert(name.to_string());
        })
        .await
    }

    pub async fn fail_remove_receiver(&self, name: &str) {
        self.with_state(|state| {
            state.failing_removes.insert(name.to_string());
        })
        .await
    }

    pub async fn clear_failures(&self) {
        self.with_state(|state| {
            state.failing_sets.clear();
            state.failing_removes.clear();
        })
        .await
    }

    async fn with_state<F, R>(&self, f: F) -> R
    where F: FnOnce(&mut State) -> R {
        let mut lock = self.inner.lock().await;
        (f)(&mut *lock)
    }
}

#[derive(Debug, Clone)]
pub struct MockDispatcher {
    state: DispatcherMockState,
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn set_receiver(
        &self,
        group: &NetworkGroupId,
        capability: &CapabilityId,
        _receiver: Arc<dyn MessageReceiver>,
    ) -> Result<(), DispatcherError> {
        let key = SubscriptionKey::new(group.clone(), capability.clone());
        self.state
            .with_state(|state| {
                state.calls.push(format!("set_receiver{}", key));
                if state.failing_sets.contains(capability.name()) {
                    return Err(DispatcherError::Unavailable("set_receiver failed".to_string()));
                }
                if !state.installed.insert(key.clone()) {
                    state.double_installs += 1;
                    return Err(DispatcherError::ReceiverAlreadyExists(key));
                }
                Ok(())
            })
            .await
    }

    async fn remove_receiver(&self, group: &NetworkGroupId, capability: &CapabilityId) -> Result<(), DispatcherError> {
        let key = SubscriptionKey::new(group.clone(), capability.clone());
        self.state
            .with_state(|state| {
                state.calls.push(format!("remove_receiver{}", key));
                if state.failing_removes.contains(capability.name()) {
                    return Err(DispatcherError::Unavailable("remove_receiver failed".to_string()));
                }
                if !state.installed.remove(&key) {
                    return Err(DispatcherError::ReceiverNotFound(key));
                }
                Ok(())
            })
            .await
    }
}
