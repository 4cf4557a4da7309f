//! Accept-loop utilities for server runtime.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::Semaphore,
    time::{Duration, sleep},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::BackoffConfig;
use crate::{
    metrics,
    server::{Shared, connection::spawn_connection_task},
};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

#[derive(Debug)]
pub(in crate::server) struct AcceptLoopOptions {
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
    /// Permits for concurrently served sockets, when capped.
    pub limit: Option<Arc<Semaphore>>,
}

/// Accepts incoming connections and spawns a handler task for each.
///
/// Every connection task gets a child of `shutdown` and is tracked by
/// `tracker`. Failures to accept trigger an exponential back-off governed
/// by `backoff`. The loop ends, dropping the listener, once `shutdown` is
/// cancelled.
pub(in crate::server) async fn accept_loop<L>(
    listener: Arc<L>,
    shared: Arc<Shared>,
    options: AcceptLoopOptions,
) where
    L: AcceptListener + 'static,
{
    let backoff = options.backoff.normalized();
    debug_assert!(
        backoff.initial_delay <= backoff.max_delay,
        "BackoffConfig invariant violated: initial_delay > max_delay"
    );
    let mut delay = backoff.initial_delay;
    while let Some(next_delay) =
        accept_iteration(listener.as_ref(), &shared, &options, &backoff, delay).await
    {
        delay = next_delay;
    }
    debug!("accept loop finished");
}

async fn accept_iteration<L>(
    listener: &L,
    shared: &Arc<Shared>,
    options: &AcceptLoopOptions,
    backoff: &BackoffConfig,
    delay: Duration,
) -> Option<Duration>
where
    L: AcceptListener + 'static,
{
    select! {
        biased;

        () = options.shutdown.cancelled() => None,
        res = listener.accept() => match res {
            Ok((stream, peer_addr)) => {
                admit(stream, peer_addr, shared, options);
                Some(backoff.initial_delay)
            }
            Err(e) => {
                metrics::inc_errors();
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                select! {
                    biased;

                    () = options.shutdown.cancelled() => None,
                    () = sleep(delay) => Some(backoff.next_delay(delay)),
                }
            }
        },
    }
}

fn admit(stream: TcpStream, peer_addr: SocketAddr, shared: &Arc<Shared>, options: &AcceptLoopOptions) {
    let permit = match &options.limit {
        Some(limit) => match Arc::clone(limit).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!("connection limit reached; dropping client: peer_addr={peer_addr}");
                return;
            }
        },
        None => None,
    };
    spawn_connection_task(
        stream,
        peer_addr,
        Arc::clone(shared),
        options.shutdown.child_token(),
        permit,
        &options.tracker,
    );
}
