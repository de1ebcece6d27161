/*
 * transport.rs
 *
 * This file is part of wayfarer-http.
 *
 * wayfarer-http is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * wayfarer-http is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 */

//! The byte-stream transport abstraction the engine drives requests over.
//!
//! [`Transport`] is the extension point: anything that can be read, written, and optionally
//! upgraded to TLS in place. [`Socket`] is the batteries-included implementation (plain TCP or
//! rustls-wrapped TCP) used by [`crate::agent::Agent`] unless the caller supplies its own.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::error::HttpError;

/// A connected, bidirectional byte stream. `Send + Unpin` so it can be boxed and moved across
/// `await` points freely.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {
    /// A human-readable description of the remote endpoint, for logging.
    fn peer_name(&self) -> String;
}

/// Plain TCP, or a TLS stream layered over it. A tagged enum rather than a trait object because
/// the in-place TLS upgrade (`Plain` → `Tls`, same underlying file descriptor) needs to consume
/// and replace the value, which is awkward through `Box<dyn Transport>`.
pub enum Socket {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Socket {
    pub async fn connect(host: &str, port: u16) -> Result<Socket, HttpError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| HttpError::Dns {
                host: host.to_string(),
                source,
            })?;
        Ok(Socket::Plain(stream))
    }

    /// Upgrade a plain socket to TLS in place, using the same underlying connection (used both
    /// for direct HTTPS connections and for the second hop of a CONNECT tunnel).
    pub async fn upgrade_tls(self, host: &str) -> Result<Socket, HttpError> {
        let Socket::Plain(stream) = self else {
            return Err(HttpError::protocol("socket is already using tls"));
        };
        let connector = TlsConnector::from(default_tls_config());
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| HttpError::InvalidUrl(format!("invalid hostname for tls: {host}")))?;
        let stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| HttpError::Tls(e.to_string()))?;
        Ok(Socket::Tls(Box::new(stream)))
    }
}

/// Native platform roots first, Mozilla's webpki-roots as a fallback if none were found.
fn build_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    if let Ok(certs) = rustls_native_certs::load_native_certs() {
        for cert in certs {
            let _ = roots.add(cert);
        }
    }
    if roots.is_empty() {
        roots.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    roots
}

fn default_tls_config() -> Arc<ClientConfig> {
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(build_root_store())
            .with_no_client_auth(),
    )
}

impl Transport for Socket {
    fn peer_name(&self) -> String {
        let addr = match self {
            Socket::Plain(s) => s.peer_addr(),
            Socket::Tls(s) => s.get_ref().0.peer_addr(),
        };
        addr.map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string())
    }
}

impl AsyncRead for Socket {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            Socket::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Socket::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

/// A type-erased transport, used by [`crate::agent::Agent`] to hold either a direct [`Socket`]
/// or a [`crate::proxy::ProxyClient`]-wrapped one behind a single concrete connection type.
pub type BoxedTransport = Box<dyn Transport>;

impl Transport for BoxedTransport {
    fn peer_name(&self) -> String {
        (**self).peer_name()
    }
}

impl AsyncRead for BoxedTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut **self.get_mut()).poll_read(cx, buf)
    }
}

impl AsyncWrite for BoxedTransport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut **self.get_mut()).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut **self.get_mut()).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut **self.get_mut()).poll_shutdown(cx)
    }
}

impl AsyncWrite for Socket {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            Socket::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Socket::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Socket::Plain(s) => Pin::new(s).poll_flush(cx),
            Socket::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Socket::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Socket::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
