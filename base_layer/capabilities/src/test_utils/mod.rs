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

/// Destructures an enum variant into its fields, panicking if `$enum` is a different variant.
macro_rules! unpack_enum {
    ($($enum_key:ident)::+ { $($idents:tt),* } = $enum:expr) => {
        let ($($idents),+) = match $enum {
            $($enum_key)::+ { $($idents),+, .. } => ($($idents),+),
            v => panic!("Unexpected enum variant {:?} given to unpack_enum", v),
        };
    };
    ($($enum_key:ident)::+ ( $($idents:tt),* ) = $enum:expr) => {
        let ($($idents),+) = match $enum {
            $($enum_key)::+($($idents),+) => ($($idents),+),
            v => panic!("Unexpected enum variant {:?} given to unpack_enum", v),
        };
    };
}

pub mod mocks;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{
    dispatcher::{MessageReceiver, RemoteMessage},
    types::{
        CapabilityDescriptor,
        CapabilityId,
        CapabilityType,
        ConfigDigest,
        Implementation,
        NetworkGroup,
        PeerId,
        RegistrySnapshot,
    },
};

pub fn peer_id(n: u8) -> PeerId {
    PeerId::from_bytes([n; PeerId::BYTE_SIZE])
}

/// Creates a group with members `peer_id(0..n)` and the largest fault tolerance `n` members support
pub fn make_group(name: &str, n: u8) -> Arc<NetworkGroup> {
    let members = (0..n).map(peer_id).collect();
    Arc::new(NetworkGroup::new(name.into(), members, n.saturating_sub(1) / 3))
}

pub fn digest(n: u8) -> ConfigDigest {
    ConfigDigest::from_bytes([n; ConfigDigest::BYTE_SIZE])
}

pub fn local_descriptor(name: &str, group: &Arc<NetworkGroup>, digest_byte: u8) -> CapabilityDescriptor {
    CapabilityDescriptor::new(
        CapabilityId::new(name, "1.0.0"),
        CapabilityType::Action,
        group.clone(),
        Implementation::LocallyImplemented {
            receiver: Arc::new(CountingReceiver::default()),
        },
        digest(digest_byte),
    )
}

pub fn remote_descriptor(name: &str, group: &Arc<NetworkGroup>, digest_byte: u8) -> CapabilityDescriptor {
    CapabilityDescriptor::new(
        CapabilityId::new(name, "1.0.0"),
        CapabilityType::Action,
        group.clone(),
        Implementation::RemotelyRouted,
        digest(digest_byte),
    )
}

pub fn snapshot(version: u64, descriptors: Vec<CapabilityDescriptor>) -> RegistrySnapshot {
    RegistrySnapshot::new(version, descriptors)
}

#[derive(Debug, Default)]
pub struct CountingReceiver {
    count: AtomicUsize,
}

impl CountingReceiver {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl MessageReceiver for CountingReceiver {
    fn receive(&self, _message: RemoteMessage) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
