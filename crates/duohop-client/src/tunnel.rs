//! Tunnel lifecycle state machine
//!
//! A tunnel binds its local endpoint, accepts exactly one connection,
//! establishes the two outbound hops (bastion session, then a stream to the
//! remote dialed from inside that session), pumps bytes with a
//! [`Forwarder`], and waits for either an explicit [`Tunnel::stop`] or an
//! internally reported dial failure. Whichever arrives first drives the
//! closing pass, which closes every owned resource exactly once, in
//! acquisition order.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use duohop_transport::{SecureDialer, SecureSession};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TunnelConfig;
use crate::error::TunnelError;
use crate::forward::Forwarder;

/// Lifecycle phase of a [`Tunnel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Created,
    Listening,
    Forwarding,
    Closing,
    Closed,
}

/// Resources opened by the tunnel, in acquisition order. Mutated only while
/// establishing; read-only once the closing pass starts.
struct Owned<S: SecureSession> {
    /// Accepted local connection, held here until the forwarder absorbs it.
    local: Option<TcpStream>,
    /// Bastion-hop session handles.
    sessions: Vec<S>,
    /// Pump over (local connection, remote-hop stream) once forwarding.
    forwarder: Option<Forwarder>,
    /// Set when shutdown begins; a racing establishment step must close its
    /// resource instead of appending it.
    closing: bool,
}

impl<S: SecureSession> Owned<S> {
    fn new() -> Self {
        Self {
            local: None,
            sessions: Vec::new(),
            forwarder: None,
            closing: false,
        }
    }
}

struct Inner<D: SecureDialer> {
    config: TunnelConfig,
    dialer: D,
    cancel: CancellationToken,
    started: AtomicBool,
    state: StdMutex<TunnelState>,
    terminal: StdMutex<Option<TunnelError>>,
    bound: StdMutex<Option<SocketAddr>>,
    owned: Mutex<Owned<D::Session>>,
}

fn relock<'a, T>(
    result: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>,
) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl<D: SecureDialer> Inner<D> {
    fn set_state(&self, state: TunnelState) {
        *relock(self.state.lock()) = state;
    }

    /// First writer wins; later terminal errors are only logged.
    fn record_terminal(&self, err: TunnelError) {
        let mut terminal = relock(self.terminal.lock());
        if terminal.is_none() {
            *terminal = Some(err);
        } else {
            debug!("terminal error already recorded, dropping: {}", err);
        }
    }
}

/// One-shot double-hop tunnel.
///
/// `Tunnel` is a cheap handle; clones share the same instance, so a clone
/// can be moved into a signal handler to call [`Tunnel::stop`] while
/// [`Tunnel::start`] runs elsewhere. An instance is not reusable after it
/// has closed.
pub struct Tunnel<D: SecureDialer> {
    inner: Arc<Inner<D>>,
}

impl<D: SecureDialer> Clone for Tunnel<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: SecureDialer> Tunnel<D> {
    pub fn new(config: TunnelConfig, dialer: D) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                dialer,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                state: StdMutex::new(TunnelState::Created),
                terminal: StdMutex::new(None),
                bound: StdMutex::new(None),
                owned: Mutex::new(Owned::new()),
            }),
        }
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.inner.config
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> TunnelState {
        *relock(self.inner.state.lock())
    }

    /// The address actually bound, once `Listening` is reached. Useful when
    /// the configured local port is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *relock(self.inner.bound.lock())
    }

    /// The recorded terminal error, or `None` after a clean stop. Stable
    /// once the tunnel has closed.
    pub fn error(&self) -> Option<TunnelError> {
        relock(self.inner.terminal.lock()).clone()
    }

    /// Request shutdown. Never blocks, never panics, and is a no-op when
    /// shutdown has already begun or finished; safe to call from any task at
    /// any point, including before `start()` has reached its wait point.
    pub fn stop(&self) {
        if !self.inner.cancel.is_cancelled() {
            info!("tunnel stop requested");
        }
        self.inner.cancel.cancel();
    }

    /// Run the tunnel to completion; resolves only once it has closed.
    ///
    /// Binds the local endpoint, accepts one connection, establishes both
    /// hops, forwards until stopped or failed, then closes everything it
    /// opened. Returns the terminal error for every failure path and
    /// `Ok(())` after an explicit [`Tunnel::stop`].
    pub async fn start(&self) -> Result<(), TunnelError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(TunnelError::AlreadyStarted);
        }

        let inner = &self.inner;
        let local = &inner.config.local;

        let listener = match TcpListener::bind((local.host.as_str(), local.port)).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("unable to bind {}: {}", local, e);
                let err = TunnelError::Listen {
                    endpoint: local.to_string(),
                    reason: e.to_string(),
                };
                inner.record_terminal(err.clone());
                inner.set_state(TunnelState::Closed);
                return Err(err);
            }
        };
        if let Ok(addr) = listener.local_addr() {
            *relock(inner.bound.lock()) = Some(addr);
        }
        inner.set_state(TunnelState::Listening);
        info!("tunnel listening on {}", local);

        // Exactly one accept, raced against an early stop.
        let conn = tokio::select! {
            _ = inner.cancel.cancelled() => {
                debug!("stop requested before a connection was accepted");
                self.close_all().await;
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    debug!("accepted local connection from {}", peer);
                    conn
                }
                Err(e) => {
                    error!("unable to accept local connection: {}", e);
                    let err = TunnelError::Accept(e.to_string());
                    inner.record_terminal(err.clone());
                    inner.set_state(TunnelState::Closed);
                    return Err(err);
                }
            }
        };

        inner.owned.lock().await.local = Some(conn);

        let (fail_tx, mut fail_rx) = mpsc::channel::<TunnelError>(1);
        tokio::spawn(establish(Arc::clone(&self.inner), fail_tx));

        // Wait for whichever comes first: an external stop or an
        // establishment failure. A finished establishment drops its sender,
        // which must not wake this point.
        let failure = tokio::select! {
            _ = inner.cancel.cancelled() => None,
            failure = async {
                match fail_rx.recv().await {
                    Some(err) => err,
                    None => std::future::pending().await,
                }
            } => Some(failure),
        };
        if let Some(err) = failure {
            inner.record_terminal(err);
        }

        self.close_all().await;

        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Closing pass: connections first, in acquisition order, then bastion
    /// sessions. Close failures are logged and never abort the remaining
    /// closes. Runs at most once per instance.
    async fn close_all(&self) {
        let inner = &self.inner;

        let (local, sessions, forwarder) = {
            let mut owned = inner.owned.lock().await;
            owned.closing = true;
            // Published under the lock, as `Forwarding` is, so the two
            // transitions cannot be observed out of order.
            inner.set_state(TunnelState::Closing);
            (
                owned.local.take(),
                std::mem::take(&mut owned.sessions),
                owned.forwarder.take(),
            )
        };

        if let Some(mut conn) = local {
            if let Err(e) = conn.shutdown().await {
                warn!("unable to close local connection: {}", e);
            }
        }
        if let Some(forwarder) = forwarder {
            forwarder.shutdown().await;
        }
        for session in sessions {
            if let Err(e) = session.close().await {
                warn!("unable to close bastion session: {}", e);
            }
        }

        inner.set_state(TunnelState::Closed);
        info!("tunnel closed");
    }
}

/// Establishment sequence: dial the bastion, then open the remote-hop
/// stream through it, then hand both connections to a forwarder. Any dial
/// failure is reported through `fail_tx` and forwarding is never entered.
async fn establish<D: SecureDialer>(inner: Arc<Inner<D>>, fail_tx: mpsc::Sender<TunnelError>) {
    let proxy = &inner.config.proxy;
    let remote = &inner.config.remote;

    let session = match inner.dialer.dial(proxy).await {
        Ok(session) => session,
        Err(e) => {
            error!("unable to open proxy connection to {}: {}", proxy, e);
            let _ = fail_tx
                .send(TunnelError::ProxyDial {
                    endpoint: proxy.to_string(),
                    reason: e.to_string(),
                })
                .await;
            return;
        }
    };

    {
        let mut owned = inner.owned.lock().await;
        if owned.closing {
            drop(owned);
            if let Err(e) = session.close().await {
                warn!("unable to close bastion session: {}", e);
            }
            return;
        }
        owned.sessions.push(session.clone());
    }

    let stream = match session.open_stream(remote).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("unable to open remote connection to {}: {}", remote, e);
            let _ = fail_tx
                .send(TunnelError::RemoteDial {
                    endpoint: remote.to_string(),
                    reason: e.to_string(),
                })
                .await;
            return;
        }
    };

    let mut owned = inner.owned.lock().await;
    if owned.closing {
        // The closing pass already ran; the session was closed there and
        // dropping the never-forwarded stream closes it.
        return;
    }
    let Some(local) = owned.local.take() else {
        return;
    };
    owned.forwarder = Some(Forwarder::spawn(local, stream));
    // Publish the state transition before releasing the lock so a racing
    // closing pass can never be observed before `Forwarding`.
    inner.set_state(TunnelState::Forwarding);
    drop(owned);

    info!(
        "forwarding {} -> {} via {}",
        inner.config.local, remote, proxy
    );
}
