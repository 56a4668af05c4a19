//! Duplex byte pump
//!
//! Copies bytes between two already-open streams, one task per direction.
//! Directions are independent: a direction ends when its source reaches EOF
//! or errors, without tearing down the other. Stream resets are non-fatal
//! and only logged.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const COPY_BUFFER_SIZE: usize = 8192;

/// Handle over the two running copy tasks.
pub struct Forwarder {
    cancel: CancellationToken,
    local_to_remote: JoinHandle<()>,
    remote_to_local: JoinHandle<()>,
}

impl Forwarder {
    /// Start pumping between `local` and `remote`. The streams are consumed;
    /// they stay open until [`Forwarder::shutdown`].
    pub fn spawn<A, B>(local: A, remote: B) -> Self
    where
        A: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        B: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let cancel = CancellationToken::new();
        let (local_read, local_write) = tokio::io::split(local);
        let (remote_read, remote_write) = tokio::io::split(remote);

        let local_to_remote = tokio::spawn(pump(
            local_read,
            remote_write,
            "local->remote",
            cancel.clone(),
        ));
        let remote_to_local = tokio::spawn(pump(
            remote_read,
            local_write,
            "remote->local",
            cancel.clone(),
        ));

        Self {
            cancel,
            local_to_remote,
            remote_to_local,
        }
    }

    /// Stop both directions and drop the streams, closing them.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.local_to_remote.await {
            debug!("local->remote pump ended abnormally: {}", e);
        }
        if let Err(e) = self.remote_to_local.await {
            debug!("remote->local pump ended abnormally: {}", e);
        }
    }
}

async fn pump<R, W>(mut reader: R, mut writer: W, direction: &'static str, cancel: CancellationToken)
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("{} pump cancelled", direction);
                break;
            }
            read = reader.read(&mut buffer) => read,
        };

        match read {
            Ok(0) => {
                debug!("{} source closed", direction);
                break;
            }
            Ok(n) => {
                trace!("{}: {} bytes", direction, n);
                // The write is raced against cancellation too: a destination
                // peer that stops reading must not pin this task in
                // `write_all` past a shutdown request.
                let wrote = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("{} pump cancelled mid-write", direction);
                        break;
                    }
                    wrote = async {
                        writer.write_all(&buffer[..n]).await?;
                        writer.flush().await
                    } => wrote,
                };
                if let Err(e) = wrote {
                    warn!("{} write failed: {}", direction, e);
                    break;
                }
            }
            // Stream resets are non-fatal: log and end this direction only.
            Err(e) => {
                warn!("{} read failed: {}", direction, e);
                break;
            }
        }
    }

    // Half-close so the destination peer sees EOF for this direction.
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::{sleep, timeout};

    const TICK: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn pumps_bytes_in_both_directions() {
        let (mut local_app, local_side) = tokio::io::duplex(4096);
        let (mut remote_app, remote_side) = tokio::io::duplex(4096);
        let forwarder = Forwarder::spawn(local_side, remote_side);

        local_app.write_all(b"PING").await.unwrap();
        let mut buf = [0u8; 4];
        timeout(TICK, remote_app.read_exact(&mut buf))
            .await
            .expect("remote should receive within a second")
            .unwrap();
        assert_eq!(&buf, b"PING");

        remote_app.write_all(b"PONG").await.unwrap();
        timeout(TICK, local_app.read_exact(&mut buf))
            .await
            .expect("local should receive within a second")
            .unwrap();
        assert_eq!(&buf, b"PONG");

        forwarder.shutdown().await;
    }

    #[tokio::test]
    async fn one_direction_closing_leaves_the_other_running() {
        let (mut local_app, local_side) = tokio::io::duplex(4096);
        let (mut remote_app, remote_side) = tokio::io::duplex(4096);
        let forwarder = Forwarder::spawn(local_side, remote_side);

        // Local peer half-closes; remote sees EOF on its read side.
        local_app.shutdown().await.unwrap();
        let mut buf = [0u8; 16];
        let n = timeout(TICK, remote_app.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(n, 0);

        // The remote->local direction keeps flowing.
        remote_app.write_all(b"STILL HERE").await.unwrap();
        let mut buf = [0u8; 10];
        timeout(TICK, local_app.read_exact(&mut buf))
            .await
            .expect("surviving direction should still deliver")
            .unwrap();
        assert_eq!(&buf, b"STILL HERE");

        forwarder.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_completes_despite_a_stalled_peer() {
        // Tiny pipes so the remote-side buffer fills quickly.
        let (mut local_app, local_side) = tokio::io::duplex(64);
        let (remote_app, remote_side) = tokio::io::duplex(64);
        let forwarder = Forwarder::spawn(local_side, remote_side);

        // The remote peer never reads, so the local->remote pump ends up
        // blocked inside a write once the pipe is full.
        let writer = tokio::spawn(async move {
            let chunk = [0u8; 64];
            while local_app.write_all(&chunk).await.is_ok() {}
        });
        sleep(Duration::from_millis(100)).await;

        timeout(TICK, forwarder.shutdown())
            .await
            .expect("shutdown must not wait on a backpressured write");

        drop(remote_app);
        let _ = writer.await;
    }

    #[tokio::test]
    async fn shutdown_closes_both_streams() {
        let (mut local_app, local_side) = tokio::io::duplex(4096);
        let (mut remote_app, remote_side) = tokio::io::duplex(4096);
        let forwarder = Forwarder::spawn(local_side, remote_side);

        forwarder.shutdown().await;

        let mut buf = [0u8; 1];
        let n = timeout(TICK, local_app.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(n, 0, "local peer should see EOF after shutdown");
        let n = timeout(TICK, remote_app.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(n, 0, "remote peer should see EOF after shutdown");
    }
}
