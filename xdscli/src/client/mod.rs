//! Drives a single ADS session from connection to shutdown.
//!
//! [`connect`] dials one of the configured servers, and [`run_discovery`]
//! opens the stream, starts an [`AdsSession`] and multiplexes termination
//! signals, session errors and received responses until the session ends.

use std::future::Future;
use std::pin::{Pin, pin};

use tokio_util::sync::CancellationToken;

use crate::client::config::{ClientConfig, ServerConfig};
use crate::client::session::AdsSession;
use crate::codec::XdsCodec;
use crate::error::{Error, Result};
use crate::output::Emitter;
use crate::transport::{Transport, TransportBuilder, TransportSink, TransportSource};

pub mod config;
pub mod session;

/// Dial a management server, bounded by the dial timeout and by `root`.
pub async fn connect<B: TransportBuilder>(
    builder: &B,
    server: &ServerConfig,
    root: &CancellationToken,
) -> Result<B::Transport> {
    tokio::select! {
        biased;
        _ = root.cancelled() => Err(Error::Cancelled),
        result = tokio::time::timeout(server.dial_timeout, builder.build(server)) => {
            result.map_err(|_| Error::DialTimeout(server.dial_timeout))?
        }
    }
}

/// Run one ADS session over `transport` and render what the server sends.
///
/// Returns `Ok(())` when the session ends because of `shutdown`, a
/// cancelled `root`, or (in one-shot mode) after the first response was
/// emitted. Returns the first session error otherwise. In every case both
/// session tasks have exited and the stream is closed on return.
pub async fn run_discovery<T, C, E, F>(
    transport: &T,
    codec: C,
    config: ClientConfig,
    emitter: &mut E,
    shutdown: F,
    root: CancellationToken,
) -> Result<()>
where
    T: Transport,
    C: XdsCodec,
    E: Emitter,
    F: Future<Output = ()>,
{
    let mut shutdown = pin!(shutdown);

    let (sink, source) = tokio::select! {
        biased;
        _ = &mut shutdown => return Ok(()),
        _ = root.cancelled() => return Ok(()),
        stream = transport.new_stream() => stream?,
    };

    let watch = config.watch;
    tracing::debug!(
        resource_type = %config.resource_type,
        node = %config.node.id,
        watch,
        "starting ADS session"
    );
    let mut session = AdsSession::start(sink, source, codec, config, root.child_token());

    loop {
        // Responses that were already accepted are emitted before a
        // concurrent signal or error is acted on.
        tokio::select! {
            biased;
            Some(response) = session.responses.recv() => {
                if let Err(e) = emitter.emit(&response) {
                    tracing::error!("failed to render response: {e}");
                    finish(session, &root).await;
                    return Err(e);
                }
                if !watch {
                    drain(session, &mut shutdown, &root).await;
                    return Ok(());
                }
            }
            _ = &mut shutdown => {
                tracing::info!("received termination signal, shutting down");
                finish(session, &root).await;
                return Ok(());
            }
            _ = root.cancelled() => {
                finish(session, &root).await;
                return Ok(());
            }
            error = session.errors.recv() => {
                let e = match error {
                    Some(e) => e,
                    // Both tasks are gone without reporting anything.
                    None => Error::Connection("ADS session tasks exited unexpectedly".to_string()),
                };
                tracing::error!("ADS session failed: {e}");
                finish(session, &root).await;
                return Err(e);
            }
        }
    }
}

async fn finish<K: TransportSink, S: TransportSource>(
    session: AdsSession<K, S>,
    root: &CancellationToken,
) {
    root.cancel();
    session.shutdown().await;
}

/// Close a one-shot session gracefully unless a signal or the root token
/// interrupts it. The session is stopped by the root token, so an
/// interrupted drain still joins both tasks before returning.
async fn drain<K, S, F>(
    session: AdsSession<K, S>,
    shutdown: &mut Pin<&mut F>,
    root: &CancellationToken,
) where
    K: TransportSink,
    S: TransportSource,
    F: Future<Output = ()>,
{
    let mut drained = pin!(session.drain());
    let interrupted = tokio::select! {
        biased;
        () = &mut drained => false,
        _ = shutdown.as_mut() => {
            tracing::info!("received termination signal while closing the stream");
            true
        }
        _ = root.cancelled() => true,
    };

    root.cancel();
    if interrupted {
        drained.await;
    }
}
