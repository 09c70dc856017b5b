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

use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::lock::Mutex;
use tokio::time;

use crate::{
    reader::{ReaderError, RegistryReader},
    types::RegistrySnapshot,
};

pub fn create_registry_reader_mock() -> (MockRegistryReader, RegistryReaderMockState) {
    let state = RegistryReaderMockState::default();
    (MockRegistryReader { state: state.clone() }, state)
}

#[derive(Debug, Clone, Default)]
pub struct RegistryReaderMockState {
    inner: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    calls: usize,
    snapshot: RegistrySnapshot,
    failures: VecDeque<ReaderError>,
    delay: Option<Duration>,
}

impl RegistryReaderMockState {
    pub async fn set_snapshot(&self, snapshot: RegistrySnapshot) {
        self.with_state(|state| {
            state.snapshot = snapshot;
        })
        .await
    }

    /// The next `n` fetches fail with `err`
    pub async fn fail_next(&self, n: usize, err: ReaderError) {
        self.with_state(|state| {
            state.failures.extend(std::iter::repeat(err).take(n));
        })
        .await
    }

    pub async fn set_delay(&self, delay: Duration) {
        self.with_state(|state| {
            state.delay = Some(delay);
        })
        .await
    }

    pub async fn call_count(&self) -> usize {
        self.with_state(|state| state.calls).await
    }

    async fn with_state<F, R>(&self, f: F) -> R
    where F: FnOnce(&mut State) -> R {
        let mut lock = self.inner.lock().await;
        (f)(&mut *lock)
    }
}

#[derive(Debug, Clone)]
pub struct MockRegistryReader {
    state: RegistryReaderMockState,
}

#[async_trait]
impl RegistryReader for MockRegistryReader {
    async fn fetch_snapshot(&self) -> Result<RegistrySnapshot, ReaderError> {
        let (result, delay) = self
            .state
            .with_state(|state| {
                state.calls += 1;
                let result = match state.failures.pop_front() {
                    Some(err) => Err(err),
                    None => Ok(state.snapshot.clone()),
                };
                (result, state.delay)
            })
            .await;
        if let Some(delay) = delay {
            time::sleep(delay).await;
        }
        result
    }
}
