/*
 * proxy.rs
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

//! `CONNECT` tunneling over an already-open transport to an HTTP proxy.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::HttpError;
use crate::headers::Headers;
use crate::parser::{Cache, Parser};
use crate::message::ResponseParser;
use crate::transport::Transport;

/// Safety bound on the `CONNECT` response: large enough for any sane proxy reply, small enough
/// that a misbehaving proxy streaming the tunnel body early can't exhaust memory.
const MAX_CONNECT_RESPONSE: usize = 64 * 1024;

/// Wraps a transport already connected to a proxy. [`ProxyClient::connect`] performs the
/// `CONNECT` handshake; on success `self` becomes, transparently, the tunnel to the target.
pub struct ProxyClient<T: Transport> {
    transport: T,
}

impl<T: Transport> ProxyClient<T> {
    pub fn new(transport: T) -> Self {
        ProxyClient { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Issue `CONNECT host:port HTTP/1.1` plus any forwarded proxy headers (typically
    /// `Proxy-Authorization`), and read the response one byte at a time so no tunnel-body bytes
    /// are ever consumed into the parser's cache.
    pub async fn connect(
        &mut self,
        host: &str,
        port: u16,
        proxy_headers: &Headers,
    ) -> Result<(), HttpError> {
        let authority = format!("{host}:{port}");
        let mut head = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
        for (name, value) in proxy_headers.iter() {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        self.transport.write_all(head.as_bytes()).await?;
        self.transport.flush().await?;

        let mut parser = ResponseParser::new();
        let mut cache = Cache::new();
        let mut total_read = 0usize;
        let mut byte = [0u8; 1];
        loop {
            let n = self.transport.read(&mut byte).await?;
            if n == 0 {
                return Err(HttpError::data(
                    "proxy closed the connection during CONNECT handshake",
                ));
            }
            total_read += 1;
            if total_read > MAX_CONNECT_RESPONSE {
                return Err(HttpError::limit("proxy CONNECT response"));
            }
            let responses = parser.feed(&mut cache, &byte)?;
            if let Some(response) = responses.into_iter().next() {
                if response.code != 200 {
                    return Err(HttpError::ProxyRefused {
                        code: response.code,
                        phrase: response.phrase,
                    });
                }
                let leftover = cache.clear();
                if !leftover.is_empty() {
                    return Err(HttpError::data(
                        "proxy sent data before CONNECT tunnel was established",
                    ));
                }
                return Ok(());
            }
        }
    }
}

impl<T: Transport> Transport for ProxyClient<T> {
    fn peer_name(&self) -> String {
        self.transport.peer_name()
    }
}

impl<T: Transport> tokio::io::AsyncRead for ProxyClient<T> {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.transport).poll_read(cx, buf)
    }
}

impl<T: Transport> tokio::io::AsyncWrite for ProxyClient<T> {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.transport).poll_write(cx, buf)
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.transport).poll_flush(cx)
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.transport).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    struct ByteFeed {
        remaining: VecDeque<u8>,
        pub written: Vec<u8>,
    }

    impl ByteFeed {
        fn new(data: &[u8]) -> Self {
            ByteFeed {
                remaining: data.iter().copied().collect(),
                written: Vec::new(),
            }
        }
    }

    impl Transport for ByteFeed {
        fn peer_name(&self) -> String {
            "proxy".to_string()
        }
    }

    impl AsyncRead for ByteFeed {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if let Some(b) = self.remaining.pop_front() {
                buf.put_slice(&[b]);
            }
            Poll::Ready(Ok(()))
        }
    }

    impl tokio::io::AsyncWrite for ByteFeed {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn successful_connect_leaves_no_leftover() {
        let transport = ByteFeed::new(b"HTTP/1.1 200 Connection Established\r\n\r\n");
        let mut client = ProxyClient::new(transport);
        client
            .connect("example.com", 443, &Headers::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_200_is_proxy_refused() {
        let transport = ByteFeed::new(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n");
        let mut client = ProxyClient::new(transport);
        let err = client
            .connect("example.com", 443, &Headers::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::ProxyRefused { code: 407, .. }));
    }
}
