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

use std::collections::{BTreeMap, BTreeSet};

use log::*;
use tari_shutdown::ShutdownSignal;

use super::{
    acquisition::is_shutdown_triggered,
    context::SyncContext,
    error::RegistrationError,
    reconcile::{Operation, ReconcilePlan, ReconcileReport},
};
use crate::types::{CapabilityDescriptor, CapabilityId, RegistrySnapshot};

const LOG_TARGET: &str = "capabilities::syncer::apply";

/// Applies a [ReconcilePlan] to the capabilities registry and dispatcher, one descriptor at a time.
///
/// A failure for one descriptor rolls that descriptor back to its previous state and the remaining operations are
/// still applied. The resulting set of active descriptors reflects what is actually held by the registry. A
/// descriptor that is active without its receiver (because a rollback failed) has the receiver reinstalled by the
/// next pass.
pub(super) struct Applier<'a> {
    context: &'a SyncContext,
    shutdown_signal: ShutdownSignal,
    active: BTreeMap<CapabilityId, CapabilityDescriptor>,
    failed_removals: BTreeSet<CapabilityId>,
}

/// An activation that could not be completed
struct ActivationFailure {
    error: RegistrationError,
    /// The registry entry could not be rolled back, so the descriptor remains registered without its receiver
    registered: bool,
}

impl<'a> Applier<'a> {
    pub fn new(context: &'a SyncContext, committed: &RegistrySnapshot, shutdown_signal: ShutdownSignal) -> Self {
        Self {
            context,
            shutdown_signal,
            active: committed.iter().map(|d| (d.id().clone(), d.clone())).collect(),
            failed_removals: BTreeSet::new(),
        }
    }

    pub async fn apply(
        mut self,
        plan: ReconcilePlan,
    ) -> (BTreeMap<CapabilityId, CapabilityDescriptor>, ReconcileReport) {
        let mut report = ReconcileReport::new(plan.version());
        let (operations, conflicts, rejected) = plan.into_parts();
        report.conflicts = conflicts;
        report.rejected = rejected;

        let removing = operations
            .iter()
            .filter(|op| op.is_remove())
            .map(|op| op.capability_id().clone())
            .collect::<BTreeSet<_>>();
        self.repair_receivers(&removing, &mut report).await;

        let num_operations = operations.len();
        for (i, operation) in operations.into_iter().enumerate() {
            // Operations already started run to completion, but none are started after a shutdown
            if is_shutdown_triggered(&mut self.shutdown_signal) {
                warn!(
                    target: LOG_TARGET,
                    "Reconciliation cancelled after {}/{} operation(s)", i, num_operations
                );
                report.cancelled = true;
                break;
            }
            trace!(target: LOG_TARGET, "Applying {}", operation);
            match operation {
                Operation::Remove(descriptor) => self.remove(descriptor, &mut report).await,
                Operation::Add { descriptor, replaces } => self.add(descriptor, replaces, &mut report).await,
            }
        }

        (self.active, report)
    }

    /// Reinstalls the receivers of active local descriptors that lost them in an earlier pass. Descriptors that are
    /// about to be removed are skipped.
    async fn repair_receivers(&mut self, removing: &BTreeSet<CapabilityId>, report: &mut ReconcileReport) {
        let installed = self.context.subscriptions.lock().await.clone();
        let unpaired = self
            .active
            .values()
            .filter(|d| !removing.contains(d.id()))
            .filter(|d| d.subscription_key().map_or(false, |key| !installed.contains(&key)))
            .cloned()
            .collect::<Vec<_>>();

        for descriptor in unpaired {
            if is_shutdown_triggered(&mut self.shutdown_signal) {
                report.cancelled = true;
                return;
            }
            match self.context.install_receiver(&descriptor).await {
                Ok(()) => {
                    info!(
                        target: LOG_TARGET,
                        "Reinstalled missing receiver for capability `{}`",
                        descriptor.id()
                    );
                    report.repaired.push(descriptor.id().clone());
                },
                Err(err) => {
                    warn!(
                        target: LOG_TARGET,
                        "Failed to reinstall receiver for capability `{}`: {}",
                        descriptor.id(),
                        err
                    );
                    report.failures.push(err);
                },
            }
        }
    }

    async fn remove(&mut self, descriptor: CapabilityDescriptor, report: &mut ReconcileReport) {
        let id = descriptor.id().clone();
        match self.deactivate(&descriptor).await {
            Ok(()) => {
                self.active.remove(&id);
                report.removed.push(id);
            },
            Err(err) => {
                warn!(target: LOG_TARGET, "Failed to remove capability `{}`: {}", id, err);
                report.failures.push(err);
                self.failed_removals.insert(id);
            },
        }
    }

    async fn add(
        &mut self,
        descriptor: CapabilityDescriptor,
        replaces: Option<CapabilityDescriptor>,
        report: &mut ReconcileReport,
    ) {
        let id = descriptor.id().clone();
        if replaces.is_some() && self.failed_removals.contains(&id) {
            debug!(
                target: LOG_TARGET,
                "Not replacing capability `{}` because the previous version could not be removed", id
            );
            return;
        }

        match self.activate(&descriptor).await {
            Ok(()) => {
                if replaces.is_some() {
                    report.removed.retain(|removed| *removed != id);
                    report.replaced.push(id.clone());
                } else {
                    report.added.push(id.clone());
                }
                self.active.insert(id, descriptor);
            },
            Err(ActivationFailure { error, registered }) => {
                warn!(target: LOG_TARGET, "Failed to add capability `{}`: {}", id, error);
                report.failures.push(error);
                if registered {
                    report.removed.retain(|removed| *removed != id);
                    self.active.insert(id, descriptor);
                } else if let Some(previous) = replaces {
                    self.restore(previous, report).await;
                }
            },
        }
    }

    /// Re-activates a descriptor that was removed as the first half of a replacement that could not be completed
    async fn restore(&mut self, previous: CapabilityDescriptor, report: &mut ReconcileReport) {
        let id = previous.id().clone();
        match self.activate(&previous).await {
            Ok(()) => {
                info!(
                    target: LOG_TARGET,
                    "Restored previous configuration {} of capability `{}`",
                    previous.config_digest(),
                    id
                );
                report.removed.retain(|removed| *removed != id);
                self.active.insert(id, previous);
            },
            Err(ActivationFailure { error, registered }) => {
                error!(
                    target: LOG_TARGET,
                    "Failed to restore previous configuration of capability `{}`: {}. It will be retried on the \
                     next refresh.",
                    id,
                    error
                );
                report.failures.push(error);
                if registered {
                    report.removed.retain(|removed| *removed != id);
                    self.active.insert(id, previous);
                }
            },
        }
    }

    /// Adds the descriptor to the registry, then installs its receiver. If the receiver cannot be installed, the
    /// registry entry is removed again.
    async fn activate(&self, descriptor: &CapabilityDescriptor) -> Result<(), ActivationFailure> {
        self.context
            .registry_add(descriptor.clone())
            .await
            .map_err(|error| ActivationFailure {
                error,
                registered: false,
            })?;
        if let Err(error) = self.context.install_receiver(descriptor).await {
            let registered = match self.context.registry_remove(descriptor.id()).await {
                Ok(()) => false,
                Err(rollback_err) => {
                    error!(
                        target: LOG_TARGET,
                        "Failed to roll back registry entry for `{}`: {}. Its receiver will be installed on the next \
                         pass.",
                        descriptor.id(),
                        rollback_err
                    );
                    true
                },
            };
            return Err(ActivationFailure { error, registered });
        }
        Ok(())
    }

    /// Uninstalls the descriptor's receiver, then removes it from the registry. If the registry refuses, the
    /// receiver is installed again. A descriptor left without its receiver is repaired by the next pass.
    async fn deactivate(&self, descriptor: &CapabilityDescriptor) -> Result<(), RegistrationError> {
        self.context.uninstall_receiver(descriptor).await?;
        if let Err(err) = self.context.registry_remove(descriptor.id()).await {
            if let Err(rollback_err) = self.context.install_receiver(descriptor).await {
                error!(
                    target: LOG_TARGET,
                    "Failed to reinstall receiver for `{}`: {}",
                    descriptor.id(),
                    rollback_err
                );
            }
            return Err(err);
        }
        Ok(())
    }
}
