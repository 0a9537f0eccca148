use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Why the gRPC server of a partition member stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The application shut the partition down.
    Requested,
    /// Every handle to the partition is gone.
    Abandoned,
}

pub fn shutdown_signal(logger: slog::Logger) -> (RpcServerShutdownHandle, RpcServerShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (
        RpcServerShutdownHandle { trigger: tx },
        RpcServerShutdownSignal { logger, rx },
    )
}

/// Stops the server when triggered, or when dropped.
pub struct RpcServerShutdownHandle {
    trigger: oneshot::Sender<ShutdownReason>,
}

impl RpcServerShutdownHandle {
    pub fn trigger(self) {
        // The server may already be gone.
        let _ = self.trigger.send(ShutdownReason::Requested);
    }
}

/// Resolves once the matching handle is triggered or dropped. Handed to tonic's
/// `serve_with_shutdown`.
pub struct RpcServerShutdownSignal {
    logger: slog::Logger,
    rx: oneshot::Receiver<ShutdownReason>,
}

impl Future for RpcServerShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let reason = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(reason)) => reason,
            Poll::Ready(Err(_)) => ShutdownReason::Abandoned,
        };

        slog::info!(self.logger, "Stopping server: {:?}", reason);
        Poll::Ready(())
    }
}
