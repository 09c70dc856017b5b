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

//! # Capabilities
//!
//! Keeps a node's local view of network capabilities in step with the authoritative capability registry.
//!
//! A capability is a unit of off-chain service offered by a network group of peers. The node learns which
//! capabilities exist, which groups provide them and which of them it implements itself from a [RegistryReader].
//! The [RegistrySyncer] periodically reconciles that declared state into:
//!
//! - the [CapabilitiesRegistry], which the rest of the node queries,
//! - the [Dispatcher], which routes inbound remote invocations to local [MessageReceiver]s, and
//! - the local [Peer], which must stay connected to every member of the groups involved.
//!
//! [LocalCapabilitiesRegistry] and [RoutingDispatcher] are in-memory implementations whose readers never lock.

#![cfg_attr(not(debug_assertions), deny(unused_variables))]
#![cfg_attr(not(debug_assertions), deny(unused_imports))]
#![cfg_attr(not(debug_assertions), deny(dead_code))]
#![cfg_attr(not(debug_assertions), deny(unused_extern_crates))]
#![deny(unused_must_use)]
#![deny(unreachable_patterns)]
#![deny(unknown_lints)]

#[cfg(test)]
#[macro_use]
mod test_utils;

pub mod config;
pub mod dispatcher;
pub mod peer;
pub mod reader;
pub mod registry;
pub mod syncer;
pub mod types;

pub use config::CapabilitiesConfig;
pub use dispatcher::{Dispatcher, MessageReceiver, RemoteMessage, RoutingDispatcher};
pub use peer::{Peer, PeerWrapper};
pub use reader::RegistryReader;
pub use registry::{CapabilitiesRegistry, LocalCapabilitiesRegistry};
pub use syncer::{RegistrySyncer, SyncerEvent, SyncerHealth, SyncerState};
