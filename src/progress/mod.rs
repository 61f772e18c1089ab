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


//! Operation progress reporting
//!
//! Every long-running operation (authorize, fulfill, decrypt) emits an
//! ordered sequence of textual status events terminated by exactly one
//! outcome event. Any front end (GUI, CLI, log sink) subscribes the
//! same way; the core never talks to a UI directly.
//!
//! The single-terminal rule is enforced here rather than trusted to each
//! operation: once a [`ProgressEvent::Finished`] has been emitted, the
//! reporter silently discards everything that follows.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One event in an operation's progress stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Intermediate status line ("Signing in...", "Downloading book...")
    Status { message: String },

    /// Terminal outcome; exactly one per operation
    Finished { success: bool, message: String },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Finished { .. })
    }
}

/// Callback type for progress subscribers
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

enum Sink {
    Channel(mpsc::UnboundedSender<ProgressEvent>),
    Callback(ProgressCallback),
    Null,
}

struct Inner {
    sink: Sink,
    finished: AtomicBool,
}

/// Handle an operation uses to publish its progress
///
/// Cheap to clone; clones share the terminal state, so helpers deep in an
/// operation cannot accidentally re-open a finished stream.
#[derive(Clone)]
pub struct Reporter {
    inner: Arc<Inner>,
}

impl Reporter {
    /// Reporter delivering events over an unbounded channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(Inner {
                    sink: Sink::Channel(tx),
                    finished: AtomicBool::new(false),
                }),
            },
            rx,
        )
    }

    /// Reporter invoking a callback for each event
    pub fn callback(f: ProgressCallback) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink: Sink::Callback(f),
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// Reporter that swallows everything (tests, fire-and-forget calls)
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(Inner {
                sink: Sink::Null,
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// Emit an intermediate status line
    pub fn status<S: Into<String>>(&self, message: S) {
        self.emit(ProgressEvent::Status {
            message: message.into(),
        });
    }

    /// Emit the successful terminal outcome
    pub fn finish_ok<S: Into<String>>(&self, message: S) {
        self.emit(ProgressEvent::Finished {
            success: true,
            message: message.into(),
        });
    }

    /// Emit the failed terminal outcome
    pub fn finish_err<S: Into<String>>(&self, message: S) {
        self.emit(ProgressEvent::Finished {
            success: false,
            message: message.into(),
        });
    }

    /// Whether the terminal event has been emitted
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ProgressEvent) {
        if event.is_terminal() {
            // First terminal event wins; everything after is dropped.
            if self.inner.finished.swap(true, Ordering::SeqCst) {
                return;
            }
        } else if self.inner.finished.load(Ordering::SeqCst) {
            return;
        }

        match &self.inner.sink {
            Sink::Channel(tx) => {
                // A dropped receiver just means nobody is listening.
                let _ = tx.send(event);
            }
            Sink::Callback(f) => f(event),
            Sink::Null => {}
        }
    }
}
