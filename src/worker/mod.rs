// Adept Core - Adobe Digital Editions DRM Lifecycle Client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Background operation workers
//!
//! Each user-initiated operation (authorize, fulfill, decrypt) runs as
//! one tokio task so the calling thread (typically a UI event loop)
//! never blocks on the network. The config store's operation lock is
//! claimed *before* spawning: a second operation started while one is in
//! flight is refused immediately with `OperationInProgress` rather than
//! queued behind it.
//!
//! Workers own the terminal progress event. The wrapped operations only
//! emit status lines; success and failure messages are produced here, in
//! exactly one `Finished` event per task.

use crate::api::auth::{authorize, AccountSession, AuthConfig, AuthorizeRequest};
use crate::api::client::Transport;
use crate::api::fulfillment::{self, fulfill, FulfilledFile};
use crate::drm::{decrypt_file, outcome_message, DecryptOutcome, Decryptor, PdfPatcher};
use crate::error::Result;
use crate::file::ConfigStore;
use crate::progress::Reporter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Spawn an authorization run
///
/// Refuses synchronously if another operation holds the store.
pub fn spawn_authorize<T: Transport + 'static>(
    store: Arc<ConfigStore>,
    transport: Arc<T>,
    config: AuthConfig,
    request: AuthorizeRequest,
    reporter: Reporter,
) -> Result<JoinHandle<Result<AccountSession>>> {
    let guard = store.try_lock_operation()?;

    Ok(tokio::spawn(async move {
        let _guard = guard;
        let result = authorize(&store, &*transport, &config, &request, &reporter).await;
        match &result {
            Ok(session) => reporter.finish_ok(session.success_message()),
            Err(e) => reporter.finish_err(e.user_message()),
        }
        result
    }))
}

/// Spawn a fulfillment run for one ACSM ticket
pub fn spawn_fulfill<T: Transport + 'static>(
    store: Arc<ConfigStore>,
    transport: Arc<T>,
    patcher: Arc<dyn PdfPatcher>,
    acsm_path: PathBuf,
    output_dir: PathBuf,
    reporter: Reporter,
) -> Result<JoinHandle<Result<FulfilledFile>>> {
    let guard = store.try_lock_operation()?;

    Ok(tokio::spawn(async move {
        let _guard = guard;
        let result = fulfill(
            &acsm_path,
            &store,
            &*transport,
            &*patcher,
            &output_dir,
            &reporter,
        )
        .await;
        match &result {
            Ok(file) => reporter.finish_ok(fulfillment::success_message(file)),
            Err(e) => reporter.finish_err(e.user_message()),
        }
        result
    }))
}

/// Spawn a decryption run for one container
pub fn spawn_decrypt(
    store: Arc<ConfigStore>,
    decryptor: Arc<dyn Decryptor>,
    input: PathBuf,
    output: PathBuf,
    reporter: Reporter,
) -> Result<JoinHandle<Result<DecryptOutcome>>> {
    let guard = store.try_lock_operation()?;

    Ok(tokio::spawn(async move {
        let _guard = guard;
        let result = decrypt_file(&*decryptor, &store, &input, &output, &reporter).await;
        match &result {
            Ok(outcome) => reporter.finish_ok(outcome_message(*outcome, &output)),
            Err(e) => reporter.finish_err(e.user_message()),
        }
        result
    }))
}
