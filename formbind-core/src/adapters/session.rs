//! Scoped acquisition with guaranteed release.
//!
//! Every adapter operation follows the same shape: acquire a session, run
//! one operation against it, release it. [`with_session`] owns that shape so
//! release happens on success, on error, and on timeout alike, and
//! [`connect_with_timeout`] bounds the acquisition step. Blocking drivers
//! use [`connect_blocking`] and [`run_blocking`] for the same guarantees.

use crate::{Result, error::ConnectorError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;

/// A live connection or session that must be closed explicitly.
#[async_trait]
pub trait EngineSession: Send + Sized {
    /// Closes the session. Failures are logged, never surfaced.
    async fn release(self);
}

/// Acquires a session, failing with a timeout error after `limit`.
///
/// # Errors
/// Returns the connect error, or a timeout error if `limit` elapses first.
pub async fn connect_with_timeout<T, F>(limit: Duration, connect: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    bounded("Connection attempt", limit, connect).await
}

/// Runs a session-less operation under a time budget.
///
/// # Errors
/// Returns the operation's error, or a timeout error naming `operation_name`.
pub async fn bounded<T, F>(operation_name: &str, limit: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, operation)
        .await
        .unwrap_or_else(|_| Err(ConnectorError::timeout(operation_name, limit)))
}

/// Runs `operation` against `session`, then releases the session.
///
/// When `limit` is set and elapses, the operation is dropped, the session is
/// still released, and a timeout error naming `operation_name` is returned.
///
/// # Errors
/// Returns the operation's error or a timeout error.
pub async fn with_session<S, T, F>(
    mut session: S,
    operation_name: &str,
    limit: Option<Duration>,
    operation: F,
) -> Result<T>
where
    S: EngineSession,
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, Result<T>>,
{
    let outcome = {
        let running = operation(&mut session);
        match limit {
            Some(limit) => tokio::time::timeout(limit, running)
                .await
                .unwrap_or_else(|_| Err(ConnectorError::timeout(operation_name, limit))),
            None => running.await,
        }
    };

    session.release().await;
    tracing::trace!("Session released after {}", operation_name);
    outcome
}

/// Acquires a session from a blocking driver within `limit`.
///
/// A connect that finishes after the caller gave up hands its session to
/// `discard` on the worker thread, so no session outlives the call.
///
/// # Errors
/// Returns the connect error, or a timeout error if `limit` elapses first.
pub async fn connect_blocking<T, C, D>(limit: Duration, connect: C, discard: D) -> Result<T>
where
    T: Send + 'static,
    C: FnOnce() -> Result<T> + Send + 'static,
    D: FnOnce(T) + Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        if let Err(Ok(late)) = sender.send(connect()) {
            tracing::debug!("Discarding a session that connected after the timeout");
            discard(late);
        }
    });

    connect_with_timeout(limit, async move {
        receiver
            .await
            .map_err(|e| ConnectorError::connection_failed("Connect worker stopped", e))?
    })
    .await
}

/// Runs blocking `work` on the blocking pool under a deadline.
///
/// When `limit` elapses, `interrupt` is called and the worker is awaited
/// before the timeout error is returned, so the worker never outlives the
/// call.
///
/// # Errors
/// Returns the work's error, or a timeout error naming `operation_name`.
pub async fn run_blocking<T, W, I>(
    operation_name: &str,
    limit: Duration,
    work: W,
    interrupt: I,
) -> Result<T>
where
    T: Send + 'static,
    W: FnOnce() -> Result<T> + Send + 'static,
    I: FnOnce(),
{
    let mut job = tokio::task::spawn_blocking(work);

    match tokio::time::timeout(limit, &mut job).await {
        Ok(joined) => {
            joined.map_err(|e| ConnectorError::query_failed("Blocking worker failed", e))?
        }
        Err(_) => {
            interrupt();
            if let Err(e) = job.await {
                tracing::warn!("Blocking worker failed after interrupt: {}", e);
            }
            Err(ConnectorError::timeout(operation_name, limit))
        }
    }
}
