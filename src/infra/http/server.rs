//! Accept loop for the HTTP surface.
//!
//! `axum::serve` always answers a request once the router returns. The render
//! route sometimes has to hang up instead, so connections are driven by
//! `hyper-util` directly: a response marked with [`ConnectionAbort`] becomes a
//! service error, and hyper closes the connection without writing anything.

use std::{future::Future, io, net::SocketAddr};

use axum::{Router, body::Body, extract::Request, response::Response};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use crate::application::pipeline::ConnectionAbort;

/// Service error that makes hyper drop the connection.
#[derive(Debug, Error)]
#[error("connection aborted by the render pipeline")]
pub struct ConnectionAborted;

/// Serve `router` on `listener` until the process ends.
pub async fn serve(listener: TcpListener, router: Router) -> io::Result<()> {
    serve_with_shutdown(listener, router, std::future::pending()).await
}

/// Serve `router` on `listener`, stopping to accept new connections once
/// `shutdown` resolves. Connections already accepted run to completion.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    router: Router,
    shutdown: F,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let builder = auto::Builder::new(TokioExecutor::new());
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "listening");

    tokio::pin!(shutdown);
    loop {
        let (stream, remote) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
            },
            () = &mut shutdown => {
                info!(addr = %local_addr, "shutdown requested; no longer accepting connections");
                return Ok(());
            }
        };

        let router = router.clone();
        let builder = builder.clone();
        tokio::spawn(async move {
            let service = service_fn(move |request: Request<Incoming>| {
                dispatch(router.clone(), request)
            });
            if let Err(err) = builder.serve_connection(TokioIo::new(stream), service).await {
                log_connection_error(remote, err.as_ref());
            }
        });
    }
}

async fn dispatch(
    router: Router,
    request: Request<Incoming>,
) -> Result<Response<Body>, ConnectionAborted> {
    let response = match router.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    if response.extensions().get::<ConnectionAbort>().is_some() {
        return Err(ConnectionAborted);
    }
    Ok(response)
}

fn log_connection_error(remote: SocketAddr, err: &(dyn std::error::Error + 'static)) {
    let aborted = std::iter::successors(Some(err), |err| err.source())
        .any(|cause| cause.is::<ConnectionAborted>());
    if aborted {
        debug!(%remote, "connection dropped after aborted request");
    } else {
        debug!(%remote, error = %err, "connection closed with error");
    }
}
