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

use std::{future::Future, time::Duration};

use futures::FutureExt;
use log::*;
use tari_shutdown::ShutdownSignal;
use tokio::time;

use super::error::{AcquisitionError, CallError, LifecycleError};
use crate::{config::CapabilitiesConfig, reader::RegistryReader, types::RegistrySnapshot};

const LOG_TARGET: &str = "capabilities::syncer::acquisition";

/// Runs `fut` with a deadline of `timeout`
pub(super) async fn with_deadline<T, E, F>(timeout: Duration, fut: F) -> Result<T, CallError<E>>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    match time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(CallError::Failed),
        Err(_) => Err(CallError::Timeout(timeout)),
    }
}

/// Returns true if the shutdown signal has triggered, without waiting for it
pub(super) fn is_shutdown_triggered(shutdown_signal: &mut ShutdownSignal) -> bool {
    shutdown_signal.is_triggered() || shutdown_signal.wait().now_or_never().is_some()
}

/// Fetches a single snapshot. The fetch is abandoned if it exceeds `timeout` or the shutdown signal triggers.
pub(super) async fn fetch_snapshot(
    reader: &dyn RegistryReader,
    timeout: Duration,
    shutdown_signal: &mut ShutdownSignal,
) -> Result<RegistrySnapshot, AcquisitionError> {
    if is_shutdown_triggered(shutdown_signal) {
        return Err(AcquisitionError::Cancelled);
    }
    tokio::select! {
        result = with_deadline(timeout, reader.fetch_snapshot()) => result.map_err(Into::into),
        _ = shutdown_signal.wait() => Err(AcquisitionError::Cancelled),
    }
}

/// Delay before the given (1-based) retry: the initial backoff doubled for each previous retry, capped at the
/// maximum backoff.
pub(super) fn backoff_delay(config: &CapabilitiesConfig, retry: usize) -> Duration {
    let exponent = u32::try_from(retry.saturating_sub(1)).unwrap_or(u32::MAX).min(31);
    config
        .initial_fetch_backoff
        .saturating_mul(1u32 << exponent)
        .min(config.max_fetch_backoff)
}

/// Fetches the initial snapshot, retrying with exponential backoff until `initial_fetch_max_attempts` attempts have
/// failed.
pub(super) async fn fetch_initial_snapshot(
    reader: &dyn RegistryReader,
    config: &CapabilitiesConfig,
    shutdown_signal: &mut ShutdownSignal,
) -> Result<RegistrySnapshot, LifecycleError> {
    let max_attempts = config.initial_fetch_max_attempts;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let last_error = match fetch_snapshot(reader, config.call_timeout, shutdown_signal).await {
            Ok(snapshot) => {
                debug!(
                    target: LOG_TARGET,
                    "Fetched initial registry snapshot version {} with {} descriptor(s) (attempt {}/{})",
                    snapshot.version(),
                    snapshot.len(),
                    attempt,
                    max_attempts
                );
                return Ok(snapshot);
            },
            Err(AcquisitionError::Cancelled) => return Err(LifecycleError::StartCancelled),
            Err(err) => err,
        };

        if attempt >= max_attempts {
            error!(
                target: LOG_TARGET,
                "Giving up on the initial registry snapshot after {} attempt(s): {}", attempt, last_error
            );
            return Err(LifecycleError::InitialFetchExhausted {
                attempts: attempt,
                last_error,
            });
        }

        let delay = backoff_delay(config, attempt);
        warn!(
            target: LOG_TARGET,
            "Initial registry snapshot fetch failed (attempt {}/{}): {}. Retrying in {:.2?}",
            attempt,
            max_attempts,
            last_error,
            delay
        );
        tokio::select! {
            _ = time::sleep(delay) => {},
            _ = shutdown_signal.wait() => return Err(LifecycleError::StartCancelled),
        }
    }
}
