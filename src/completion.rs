// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! One-shot results for long-running operations.
//!
//! Every decode, encode, pixel I/O and receiver read has an `_async` form
//! returning a [`Completion`]. The work itself is submitted immediately to a
//! worker pool; the `Completion` is only the receiving end of a one-shot
//! channel and can be consumed in one of two equivalent ways:
//!
//! - `.await` it (it implements [`Future`]), or
//! - hand it a callback with [`Completion::on_complete`], which is invoked
//!   exactly once with the same `Result` the future would have produced.
//!
//! Operations cannot be cancelled. Dropping a `Completion` discards the
//! result while the work still runs to completion.
//!
//! Work runs on the blocking pool of the caller's tokio runtime when one is
//! active, otherwise on an internal multi-threaded runtime which is started
//! on first use. Callbacks are invoked on that pool rather than on the
//! caller's thread.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::{
    fmt,
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    runtime::{Builder, Handle, Runtime, RuntimeFlavor},
    sync::oneshot,
};
use tracing::debug;

static WORKERS: Lazy<Result<Runtime, String>> = Lazy::new(|| {
    debug!("starting image worker runtime");
    Builder::new_multi_thread()
        .thread_name("image-worker")
        .enable_time()
        .build()
        .map_err(|err| err.to_string())
});

fn worker_handle() -> Result<Handle> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle);
    }
    match &*WORKERS {
        Ok(runtime) => Ok(runtime.handle().clone()),
        Err(err) => Err(Error::Io(io::Error::other(format!(
            "image worker runtime unavailable: {err}"
        )))),
    }
}

fn interrupted() -> Error {
    Error::Interrupted("worker dropped the result channel".to_string())
}

/// The pending result of an asynchronous operation.
#[must_use = "a Completion does nothing unless awaited or given a callback"]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T: Send + 'static> Completion<T> {
    /// Runs blocking `work` on the worker pool.
    pub(crate) fn blocking<F>(work: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        match worker_handle() {
            Ok(handle) => {
                handle.spawn_blocking(move || {
                    // the receiver may have been dropped, the result is discarded
                    let _ = tx.send(work());
                });
            }
            Err(err) => {
                let _ = tx.send(Err(err));
            }
        }
        Completion { rx }
    }

    /// Drives `future` on the worker runtime.
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        match worker_handle() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _ = tx.send(future.await);
                });
            }
            Err(err) => {
                let _ = tx.send(Err(err));
            }
        }
        Completion { rx }
    }

    /// A completion which already holds its result.
    pub fn ready(result: Result<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Completion { rx }
    }

    /// Invokes `callback` exactly once with the operation's result.
    pub fn on_complete<C>(self, callback: C)
    where
        C: FnOnce(Result<T>) + Send + 'static,
    {
        match worker_handle() {
            Ok(handle) => {
                handle.spawn(async move { callback(self.await) });
            }
            Err(err) => callback(Err(err)),
        }
    }

    /// Blocks the current thread until the result is available.
    ///
    /// Inside a multi-threaded runtime the worker is handed over with
    /// [`block_in_place`](tokio::task::block_in_place) while waiting.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when called on a current-thread runtime,
    /// which cannot make progress while blocked; `.await` instead.
    pub fn wait(self) -> Result<T> {
        let Ok(handle) = Handle::try_current() else {
            return self.rx.blocking_recv().unwrap_or_else(|_| Err(interrupted()));
        };
        match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => Err(Error::InvalidArgument(
                "cannot block a current-thread runtime, await the completion instead".into(),
            )),
            _ => tokio::task::block_in_place(|| handle.block_on(self)),
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(interrupted())))
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}
