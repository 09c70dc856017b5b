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

use std::{
    collections::BTreeSet,
    fmt,
    str::FromStr,
    sync::Arc,
};

use blake2::{Blake2s256, Digest};
use thiserror::Error;

use crate::dispatcher::MessageReceiver;

/// Identifies a capability by name and version. Rendered as `name@version`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapabilityId {
    name: String,
    version: String,
}

impl CapabilityId {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, version: V) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid capability id `{0}`: expected `name@version`")]
pub struct CapabilityIdParseError(String);

impl FromStr for CapabilityId {
    type Err = CapabilityIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() && !version.contains('@') => {
                Ok(Self::new(name, version))
            },
            _ => Err(CapabilityIdParseError(s.to_string())),
        }
    }
}

/// Identifier of a network group (the set of peers that jointly provide or consume a capability).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetworkGroupId(String);

impl NetworkGroupId {
    pub fn new<T: Into<String>>(id: T) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NetworkGroupId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for NetworkGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Network identity of a peer
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId([u8; PeerId::BYTE_SIZE]);

impl PeerId {
    pub const BYTE_SIZE: usize = 32;

    pub const fn from_bytes(bytes: [u8; Self::BYTE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Abbreviated hex representation suitable for log lines
    pub fn short_str(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short_str())
    }
}

/// Digest of a capability's configuration. Two descriptors with the same id and digest are considered identical.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigDigest([u8; ConfigDigest::BYTE_SIZE]);

impl ConfigDigest {
    pub const BYTE_SIZE: usize = 32;

    pub const fn from_bytes(bytes: [u8; Self::BYTE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Computes the BLAKE2s-256 digest of the raw capability configuration
    pub fn from_config(config: &[u8]) -> Self {
        let hash = Blake2s256::digest(config);
        let mut bytes = [0u8; Self::BYTE_SIZE];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }
}

impl fmt::Display for ConfigDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ConfigDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigDigest({})", hex::encode(&self.0[..8]))
    }
}

/// A group of peers that jointly provide or consume capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkGroup {
    id: NetworkGroupId,
    members: Vec<PeerId>,
    /// Number of faulty members the group tolerates
    f: u8,
}

impl NetworkGroup {
    pub fn new(id: NetworkGroupId, members: Vec<PeerId>, f: u8) -> Self {
        Self { id, members, f }
    }

    pub fn id(&self) -> &NetworkGroupId {
        &self.id
    }

    pub fn members(&self) -> &[PeerId] {
        &self.members
    }

    pub fn fault_tolerance(&self) -> u8 {
        self.f
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityType {
    Trigger,
    Action,
    Consensus,
    Target,
}

impl fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityType::Trigger => f.write_str("trigger"),
            CapabilityType::Action => f.write_str("action"),
            CapabilityType::Consensus => f.write_str("consensus"),
            CapabilityType::Target => f.write_str("target"),
        }
    }
}

/// How invocations of a capability reach an implementation.
#[derive(Clone)]
pub enum Implementation {
    /// This node implements the capability. Inbound remote invocations are delivered to `receiver`.
    LocallyImplemented { receiver: Arc<dyn MessageReceiver> },
    /// The capability is implemented by the members of the owning network group.
    RemotelyRouted,
}

impl Implementation {
    pub fn is_local(&self) -> bool {
        matches!(self, Implementation::LocallyImplemented { .. })
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Implementation::LocallyImplemented { .. } => f.write_str("LocallyImplemented"),
            Implementation::RemotelyRouted => f.write_str("RemotelyRouted"),
        }
    }
}

/// Key of a routing entry on the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionKey {
    pub group: NetworkGroupId,
    pub capability: CapabilityId,
}

impl SubscriptionKey {
    pub fn new(group: NetworkGroupId, capability: CapabilityId) -> Self {
        Self { group, capability }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.group, self.capability)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Capability `{0}` has an empty name or version")]
    EmptyIdentifier(CapabilityId),
    #[error("Capability `{id}` belongs to network group `{group}` which has no members")]
    EmptyNetworkGroup { id: CapabilityId, group: NetworkGroupId },
    #[error("Capability `{id}` belongs to network group `{group}` which lists peer {peer} more than once")]
    DuplicateGroupMember {
        id: CapabilityId,
        group: NetworkGroupId,
        peer: PeerId,
    },
    #[error(
        "Capability `{id}` belongs to network group `{group}` with {members} member(s) which cannot tolerate f={f} \
         faults"
    )]
    InsufficientGroupSize {
        id: CapabilityId,
        group: NetworkGroupId,
        members: usize,
        f: u8,
    },
}

/// Declaration of a single capability. Descriptors are immutable; a changed capability is represented by a new
/// descriptor that replaces the old one.
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    id: CapabilityId,
    capability_type: CapabilityType,
    group: Arc<NetworkGroup>,
    implementation: Implementation,
    config_digest: ConfigDigest,
}

impl CapabilityDescriptor {
    pub fn new(
        id: CapabilityId,
        capability_type: CapabilityType,
        group: Arc<NetworkGroup>,
        implementation: Implementation,
        config_digest: ConfigDigest,
    ) -> Self {
        Self {
            id,
            capability_type,
            group,
            implementation,
            config_digest,
        }
    }

    pub fn id(&self) -> &CapabilityId {
        &self.id
    }

    pub fn capability_type(&self) -> CapabilityType {
        self.capability_type
    }

    pub fn group(&self) -> &NetworkGroup {
        &self.group
    }

    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    pub fn config_digest(&self) -> &ConfigDigest {
        &self.config_digest
    }

    pub fn is_local(&self) -> bool {
        self.implementation.is_local()
    }

    /// Returns the dispatcher key for this descriptor, or None if it is not implemented on this node.
    pub fn subscription_key(&self) -> Option<SubscriptionKey> {
        if self.is_local() {
            Some(SubscriptionKey::new(self.group.id().clone(), self.id.clone()))
        } else {
            None
        }
    }

    pub fn receiver(&self) -> Option<Arc<dyn MessageReceiver>> {
        match &self.implementation {
            Implementation::LocallyImplemented { receiver } => Some(receiver.clone()),
            Implementation::RemotelyRouted => None,
        }
    }

    /// Checks that the descriptor is well-formed enough to be activated
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.name().is_empty() || self.id.version().is_empty() {
            return Err(ValidationError::EmptyIdentifier(self.id.clone()));
        }
        let members = self.group.members();
        if members.is_empty() {
            return Err(ValidationError::EmptyNetworkGroup {
                id: self.id.clone(),
                group: self.group.id().clone(),
            });
        }
        let mut seen = BTreeSet::new();
        for peer in members {
            if !seen.insert(peer) {
                return Err(ValidationError::DuplicateGroupMember {
                    id: self.id.clone(),
                    group: self.group.id().clone(),
                    peer: *peer,
                });
            }
        }
        // A group of n members tolerates f byzantine faults only if n >= 3f + 1
        let f = self.group.fault_tolerance();
        if members.len() < 3 * usize::from(f) + 1 {
            return Err(ValidationError::InsufficientGroupSize {
                id: self.id.clone(),
                group: self.group.id().clone(),
                members: members.len(),
                f,
            });
        }
        Ok(())
    }
}

/// The set of peers the node must stay connected to
pub type PeerSet = BTreeSet<PeerId>;

/// A versioned collection of capability descriptors, ordered by capability id.
///
/// Snapshots read from the registry source may contain more than one descriptor for an id. Snapshots committed by
/// the syncer never do.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    version: u64,
    descriptors: Vec<CapabilityDescriptor>,
}

impl RegistrySnapshot {
    pub fn new(version: u64, mut descriptors: Vec<CapabilityDescriptor>) -> Self {
        // Stable sort: duplicates keep their source order
        descriptors.sort_by(|a, b| a.id().cmp(b.id()));
        Self { version, descriptors }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDescriptor> + '_ {
        self.descriptors.iter()
    }

    /// Returns the first descriptor with the given id
    pub fn get(&self, id: &CapabilityId) -> Option<&CapabilityDescriptor> {
        let pos = self.descriptors.partition_point(|d| d.id() < id);
        self.descriptors.get(pos).filter(|d| d.id() == id)
    }

    pub fn contains(&self, id: &CapabilityId) -> bool {
        self.get(id).is_some()
    }

    /// All peers in the network groups of the descriptors in this snapshot, excluding `local_peer`.
    pub fn peer_set(&self, local_peer: &PeerId) -> PeerSet {
        self.descriptors
            .iter()
            .flat_map(|d| d.group().members().iter())
            .filter(|peer| *peer != local_peer)
            .copied()
            .collect()
    }

    /// Dispatcher keys implied by the locally implemented descriptors in this snapshot
    pub fn subscription_keys(&self) -> BTreeSet<SubscriptionKey> {
        self.descriptors.iter().filter_map(|d| d.subscription_key()).collect()
    }
}

impl From<RegistrySnapshot> for Vec<CapabilityDescriptor> {
    fn from(snapshot: RegistrySnapshot) -> Self {
        snapshot.descriptors
    }
}
