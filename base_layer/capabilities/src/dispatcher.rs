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

//! Routing of inbound remote-invocation messages to local capability handlers.

use std::{collections::HashMap, fmt, sync::Arc};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use log::*;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::types::{CapabilityId, NetworkGroupId, PeerId, SubscriptionKey};

const LOG_TARGET: &str = "capabilities::dispatcher";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatcherError {
    #[error("A receiver is already installed for {0}")]
    ReceiverAlreadyExists(SubscriptionKey),
    #[error("No receiver is installed for {0}")]
    ReceiverNotFound(SubscriptionKey),
    #[error("Dispatcher unavailable: {0}")]
    Unavailable(String),
}

/// An inbound remote-invocation message addressed to a capability of a network group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    pub sender: PeerId,
    pub group: NetworkGroupId,
    pub capability: CapabilityId,
    pub payload: Vec<u8>,
}

impl RemoteMessage {
    pub fn subscription_key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.group.clone(), self.capability.clone())
    }
}

/// Local handler of remote invocations of a capability
pub trait MessageReceiver: Send + Sync {
    fn receive(&self, message: RemoteMessage);
}

/// Routing table of (network group, capability) to receiver. Exactly one receiver may be installed per key.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn set_receiver(
        &self,
        group: &NetworkGroupId,
        capability: &CapabilityId,
        receiver: Arc<dyn MessageReceiver>,
    ) -> Result<(), DispatcherError>;

    async fn remove_receiver(&self, group: &NetworkGroupId, capability: &CapabilityId) -> Result<(), DispatcherError>;
}

type ReceiverTable = HashMap<SubscriptionKey, Arc<dyn MessageReceiver>>;

/// In-memory [Dispatcher]. Installing or removing a receiver publishes a new copy of the routing table, so
/// [RoutingDispatcher::dispatch] never waits on a writer.
#[derive(Default)]
pub struct RoutingDispatcher {
    receivers: ArcSwap<ReceiverTable>,
    write_lock: Mutex<()>,
}

impl RoutingDispatcher {
    pub fn new() -> Self {
        Default::default()
    }

    /// Delivers the message to the receiver installed for its (group, capability) key.
    pub fn dispatch(&self, message: RemoteMessage) -> Result<(), DispatcherError> {
        let key = message.subscription_key();
        let receivers = self.receivers.load();
        match receivers.get(&key) {
            Some(receiver) => {
                trace!(
                    target: LOG_TARGET,
                    "Dispatching message from peer {} to {}",
                    message.sender.short_str(),
                    key
                );
                receiver.receive(message);
                Ok(())
            },
            None => {
                debug!(
                    target: LOG_TARGET,
                    "Dropping message from peer {}: no receiver for {}",
                    message.sender.short_str(),
                    key
                );
                Err(DispatcherError::ReceiverNotFound(key))
            },
        }
    }

    pub fn has_receiver(&self, key: &SubscriptionKey) -> bool {
        self.receivers.load().contains_key(key)
    }

    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys = self.receivers.load().keys().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.receivers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RoutingDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingDispatcher").field("keys", &self.keys()).finish()
    }
}

#[async_trait]
impl Dispatcher for RoutingDispatcher {
    async fn set_receiver(
        &self,
        group: &NetworkGroupId,
        capability: &CapabilityId,
        receiver: Arc<dyn MessageReceiver>,
    ) -> Result<(), DispatcherError> {
        let _guard = self.write_lock.lock().await;
        let key = SubscriptionKey::new(group.clone(), capability.clone());
        let current = self.receivers.load();
        if current.contains_key(&key) {
            return Err(DispatcherError::ReceiverAlreadyExists(key));
        }
        let mut next = ReceiverTable::clone(&current);
        debug!(target: LOG_TARGET, "Installing receiver for {}", key);
        next.insert(key, receiver);
        self.receivers.store(Arc::new(next));
        Ok(())
    }

    async fn remove_receiver(&self, group: &NetworkGroupId, capability: &CapabilityId) -> Result<(), DispatcherError> {
        let _guard = self.write_lock.lock().await;
        let key = SubscriptionKey::new(group.clone(), capability.clone());
        let current = self.receivers.load();
        if !current.contains_key(&key) {
            return Err(DispatcherError::ReceiverNotFound(key));
        }
        let mut next = ReceiverTable::clone(&current);
        next.remove(&key);
        debug!(target: LOG_TARGET, "Removed receiver for {}", key);
        self.receivers.store(Arc::new(next));
        Ok(())
    }
}
