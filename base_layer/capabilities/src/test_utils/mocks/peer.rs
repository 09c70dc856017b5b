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

use std::sync::Arc;

use async_trait::async_trait;
use futures::lock::Mutex;

use crate::{
    peer::{Peer, PeerError, PeerWrapper},
    types::{PeerId, PeerSet},
};

pub fn create_peer_mock(id: PeerId) -> (MockPeer, PeerMockState) {
    let state = PeerMockState::default();
    (MockPeer { id, state: state.clone() }, state)
}

#[derive(Debug, Clone, Default)]
pub struct PeerMockState {
    inner: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    updates: Vec<PeerSet>,
    fail_updates: bool,
}

impl PeerMockState {
    /// Every peer set pushed so far, oldest first
    pub async fn updates(&self) -> Vec<PeerSet> {
        self.with_state(|state| state.updates.clone()).await
    }

    pub async fn last_update(&self) -> Option<PeerSet> {
        self.with_state(|state| state.updates.last().cloned()).await
    }

    pub async fn update_count(&self) -> usize {
        self.with_state(|state| state.updates.len()).await
    }

    pub async fn set_fail_updates(&self, fail: bool) {
        self.with_state(|state| {
            state.fail_updates = fail;
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
pub struct MockPeer {
    id: PeerId,
    state: PeerMockState,
}

#[async_trait]
impl Peer for MockPeer {
    fn id(&self) -> PeerId {
        self.id
    }

    async fn update_connections(&self, peers: PeerSet) -> Result<(), PeerError> {
        self.state
            .with_state(|state| {
                state.updates.push(peers);
                if state.fail_updates {
                    return Err(PeerError::UpdateConnectionsFailed("peer update failed".to_string()));
                }
                Ok(())
            })
            .await
    }
}

pub struct MockPeerWrapper {
    peer: Option<Arc<dyn Peer>>,
}

impl MockPeerWrapper {
    pub fn new(peer: MockPeer) -> Self {
        let peer: Arc<dyn Peer> = Arc::new(peer);
        Self { peer: Some(peer) }
    }

    /// A wrapper whose networking stack has not started
    pub fn unavailable() -> Self {
        Self { peer: None }
    }
}

impl PeerWrapper for MockPeerWrapper {
    fn peer(&self) -> Option<Arc<dyn Peer>> {
        self.peer.clone()
    }
}
