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

//! Computes the operations that take the committed registry state to the state declared by a newly fetched
//! snapshot.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use super::error::{ConflictError, RegistrationError};
use crate::types::{CapabilityDescriptor, CapabilityId, ConfigDigest, RegistrySnapshot, ValidationError};

#[derive(Debug, Clone)]
pub enum Operation {
    /// Deactivate the given (currently active) descriptor
    Remove(CapabilityDescriptor),
    /// Activate `descriptor`. `replaces` is set when this is the second half of an update, in which case the
    /// matching `Remove` precedes this operation.
    Add {
        descriptor: CapabilityDescriptor,
        replaces: Option<CapabilityDescriptor>,
    },
}

impl Operation {
    pub fn capability_id(&self) -> &CapabilityId {
        match self {
            Operation::Remove(descriptor) => descriptor.id(),
            Operation::Add { descriptor, .. } => descriptor.id(),
        }
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Operation::Remove(_))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Remove(descriptor) => write!(f, "Remove({})", descriptor.id()),
            Operation::Add {
                descriptor,
                replaces: None,
            } => write!(f, "Add({})", descriptor.id()),
            Operation::Add {
                descriptor,
                replaces: Some(_),
            } => write!(f, "Replace({})", descriptor.id()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    version: u64,
    operations: Vec<Operation>,
    conflicts: Vec<ConflictError>,
    rejected: Vec<ValidationError>,
}

impl ReconcilePlan {
    /// Version of the snapshot this plan converges to
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Operations in the order they must be applied. All removals come before all additions.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn conflicts(&self) -> &[ConflictError] {
        &self.conflicts
    }

    pub fn rejected(&self) -> &[ValidationError] {
        &self.rejected
    }

    pub fn is_noop(&self) -> bool {
        self.operations.is_empty()
    }

    pub(super) fn into_parts(self) -> (Vec<Operation>, Vec<ConflictError>, Vec<ValidationError>) {
        (self.operations, self.conflicts, self.rejected)
    }
}

/// Diffs `committed` against `fetched`.
///
/// Ids only in `committed` are removed, ids only in `fetched` are added and ids whose config digest changed are
/// replaced (removed, then added). Ids that `fetched` declares with conflicting digests, or whose descriptor is
/// invalid, are left as they are in `committed`.
pub fn plan_reconciliation(committed: &RegistrySnapshot, fetched: &RegistrySnapshot) -> ReconcilePlan {
    let mut declared = BTreeMap::<&CapabilityId, Vec<&CapabilityDescriptor>>::new();
    for descriptor in fetched.iter() {
        declared.entry(descriptor.id()).or_default().push(descriptor);
    }

    let mut conflicts = Vec::new();
    let mut rejected = Vec::new();
    let mut skipped = BTreeSet::new();
    let mut incoming = BTreeMap::new();
    for (id, descriptors) in declared {
        let digests = descriptors
            .iter()
            .map(|d| *d.config_digest())
            .collect::<BTreeSet<ConfigDigest>>();
        if digests.len() > 1 {
            conflicts.push(ConflictError {
                id: id.clone(),
                digests: digests.into_iter().collect(),
            });
            skipped.insert(id);
            continue;
        }

        // All declarations are identical, take the first
        let descriptor = descriptors[0];
        if let Err(err) = descriptor.validate() {
            rejected.push(err);
            skipped.insert(id);
            continue;
        }
        incoming.insert(id, descriptor);
    }

    let mut removals = Vec::new();
    let mut additions = Vec::new();
    let mut active = BTreeSet::new();
    for current in committed.iter() {
        let id = current.id();
        active.insert(id.clone());
        if skipped.contains(id) {
            continue;
        }
        match incoming.get(id) {
            None => removals.push(Operation::Remove(current.clone())),
            Some(next) if next.config_digest() != current.config_digest() => {
                removals.push(Operation::Remove(current.clone()));
                additions.push(Operation::Add {
                    descriptor: (*next).clone(),
                    replaces: Some(current.clone()),
                });
            },
            Some(_) => {},
        }
    }

    for (id, descriptor) in incoming {
        if !active.contains(id) {
            additions.push(Operation::Add {
                descriptor: descriptor.clone(),
                replaces: None,
            });
        }
    }
    // Replacements and new additions were produced in two passes, restore id order
    additions.sort_by(|a, b| a.capability_id().cmp(b.capability_id()));

    removals.extend(additions);
    ReconcilePlan {
        version: fetched.version(),
        operations: removals,
        conflicts,
        rejected,
    }
}

/// The result of a reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Version of the committed snapshot after this pass
    pub version: u64,
    pub added: Vec<CapabilityId>,
    pub removed: Vec<CapabilityId>,
    pub replaced: Vec<CapabilityId>,
    /// Committed capabilities whose missing receiver was reinstalled
    pub repaired: Vec<CapabilityId>,
    pub conflicts: Vec<ConflictError>,
    pub rejected: Vec<ValidationError>,
    pub failures: Vec<RegistrationError>,
    /// Set if the pass stopped early because the syncer is closing
    pub cancelled: bool,
    /// Set if the peer connection update failed after the changes were applied
    pub peer_update_failed: bool,
}

impl ReconcileReport {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() ||
            !self.removed.is_empty() ||
            !self.replaced.is_empty() ||
            !self.repaired.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() &&
            self.rejected.is_empty() &&
            self.failures.is_empty() &&
            !self.cancelled &&
            !self.peer_update_failed
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version {}: {} added, {} removed, {} replaced, {} conflict(s), {} rejected, {} failure(s)",
            self.version,
            self.added.len(),
            self.removed.len(),
            self.replaced.len(),
            self.conflicts.len(),
            self.rejected.len(),
            self.failures.len()
        )?;
        if !self.repaired.is_empty() {
            write!(f, ", {} repaired", self.repaired.len())?;
        }
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}
