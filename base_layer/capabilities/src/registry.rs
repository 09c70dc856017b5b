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

//! The node's capability registry.

use std::{collections::BTreeMap, fmt, sync::Arc};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use log::*;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::types::{CapabilityDescriptor, CapabilityId};

const LOG_TARGET: &str = "capabilities::registry";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Capability `{0}` is already registered")]
    DuplicateCapability(CapabilityId),
    #[error("Capability `{0}` is not registered")]
    CapabilityNotFound(CapabilityId),
    #[error("Capabilities registry unavailable: {0}")]
    Unavailable(String),
}

/// Store of active capabilities, queried by the rest of the node.
#[async_trait]
pub trait CapabilitiesRegistry: Send + Sync {
    /// Registers a capability. Adding an id that is already registered is an error.
    async fn add(&self, descriptor: CapabilityDescriptor) -> Result<(), RegistryError>;

    async fn remove(&self, id: &CapabilityId) -> Result<(), RegistryError>;
}

pub type CapabilityMap = BTreeMap<CapabilityId, CapabilityDescriptor>;

/// In-memory [CapabilitiesRegistry].
///
/// Every write publishes a new immutable map, readers load the current map without taking a lock.
#[derive(Default)]
pub struct LocalCapabilitiesRegistry {
    capabilities: ArcSwap<CapabilityMap>,
    write_lock: Mutex<()>,
}

impl LocalCapabilitiesRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, id: &CapabilityId) -> Option<CapabilityDescriptor> {
        self.capabilities.load().get(id).cloned()
    }

    pub fn contains(&self, id: &CapabilityId) -> bool {
        self.capabilities.load().contains_key(id)
    }

    /// Returns the current set of capabilities. The returned map is unaffected by later writes.
    pub fn list(&self) -> Arc<CapabilityMap> {
        self.capabilities.load_full()
    }

    pub fn len(&self) -> usize {
        self.capabilities.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for LocalCapabilitiesRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCapabilitiesRegistry")
            .field("capabilities", &self.capabilities.load().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl CapabilitiesRegistry for LocalCapabilitiesRegistry {
    async fn add(&self, descriptor: CapabilityDescriptor) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        let current = self.capabilities.load();
        if current.contains_key(descriptor.id()) {
            return Err(RegistryError::DuplicateCapability(descriptor.id().clone()));
        }
        let mut next = CapabilityMap::clone(&current);
        debug!(
            target: LOG_TARGET,
            "Registering {} capability `{}` ({:?}) for network group `{}`",
            descriptor.capability_type(),
            descriptor.id(),
            descriptor.implementation(),
            descriptor.group().id()
        );
        next.insert(descriptor.id().clone(), descriptor);
        self.capabilities.store(Arc::new(next));
        Ok(())
    }

    async fn remove(&self, id: &CapabilityId) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        let current = self.capabilities.load();
        if !current.contains_key(id) {
            return Err(RegistryError::CapabilityNotFound(id.clone()));
        }
        let mut next = CapabilityMap::clone(&current);
        next.remove(id);
        debug!(target: LOG_TARGET, "Removed capability `{}`", id);
        self.capabilities.store(Arc::new(next));
        Ok(())
    }
}
