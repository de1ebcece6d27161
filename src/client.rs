/*
 * client.rs
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

//! Drives exactly one request/response at a time over an owned transport.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::body::{CompoundDecoder, DecodedItem};
use crate::error::HttpError;
use crate::message::request::Body;
use crate::message::{Request, Response, ResponseParser};
use crate::parser::{Cache, Parser};
use crate::transport::Transport;

/// Default read/write chunk size for both request-body streaming and response reads, carried
/// over from the blocking-socket implementation this engine is modelled on.
pub const DEFAULT_PACKET_SIZE: usize = 8192;

/// A client bound to one already-connected transport. Requests are strictly sequential: the
/// `&mut self` receiver on [`Client::make_request`] is the only concurrency guarantee needed,
/// since there is never more than one request in flight on a given connection.
pub struct Client<T: Transport> {
    transport: T,
    /// Bytes read past the end of the previous response, not yet consumed.
    pending: BytesMut,
    /// Total raw bytes (headers + body) allowed for one request/response round trip.
    pub sizelimit: Option<i64>,
    /// Decoded body bytes allowed for one response.
    pub bodylimit: Option<u64>,
    pub packetsize: usize,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Client {
            transport,
            pending: BytesMut::new(),
            sizelimit: None,
            bodylimit: None,
            packetsize: DEFAULT_PACKET_SIZE,
        }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn make_request(&mut self, request: &mut Request) -> Result<Response, HttpError> {
        self.write_request(request).await?;

        let mut raw_read: u64 = self.pending.len() as u64;
        self.check_size_limit(raw_read)?;

        let mut parser = ResponseParser::new();
        let mut cache = Cache::new();
        let pending = std::mem::take(&mut self.pending);
        let mut responses = parser.feed(&mut cache, &pending)?;

        let mut buf = vec![0u8; self.packetsize];
        while responses.is_empty() {
            let n = self.transport.read(&mut buf).await?;
            if n == 0 {
                return Err(HttpError::data(
                    "connection closed before response headers completed",
                ));
            }
            raw_read += n as u64;
            self.check_size_limit(raw_read)?;
            responses = parser.feed(&mut cache, &buf[..n])?;
        }
        let mut response = responses.remove(0);
        let leftover = cache.clear();

        let mut decoder = CompoundDecoder::from_response(&request.method, &response)?;
        if decoder.is_empty() {
            self.pending = leftover;
            response.body = Vec::new();
            return Ok(response);
        }

        let mut body = Vec::new();
        let items = decoder.parse(&leftover)?;
        apply_items(&mut response, &mut body, items, self.bodylimit)?;

        while !decoder.is_done() {
            let n = self.transport.read(&mut buf).await?;
            if n == 0 {
                let items = decoder.finish()?;
                apply_items(&mut response, &mut body, items, self.bodylimit)?;
                break;
            }
            raw_read += n as u64;
            self.check_size_limit(raw_read)?;
            let items = decoder.parse(&buf[..n])?;
            apply_items(&mut response, &mut body, items, self.bodylimit)?;
        }

        self.pending = decoder.clear();
        response.body = body;
        Ok(response)
    }

    async fn write_request(&mut self, request: &mut Request) -> Result<(), HttpError> {
        let mut head = Vec::new();
        request.write_head(&mut head);
        self.transport.write_all(&head).await?;

        match &mut request.body {
            None => {}
            Some(Body::Bytes(bytes)) => {
                if !bytes.is_empty() {
                    self.transport.write_all(bytes).await?;
                }
            }
            Some(Body::Reader(reader)) => {
                let mut buf = vec![0u8; self.packetsize];
                loop {
                    let n = reader.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    self.transport.write_all(&buf[..n]).await?;
                }
            }
        }
        self.transport.flush().await?;
        Ok(())
    }

    fn check_size_limit(&self, raw_read: u64) -> Result<(), HttpError> {
        if let Some(limit) = self.sizelimit {
            if raw_read as i64 > limit {
                return Err(HttpError::limit("size"));
            }
        }
        Ok(())
    }
}

fn apply_items(
    response: &mut Response,
    body: &mut Vec<u8>,
    items: Vec<DecodedItem>,
    bodylimit: Option<u64>,
) -> Result<(), HttpError> {
    for item in items {
        match item {
            DecodedItem::Data(bytes) => {
                body.extend_from_slice(&bytes);
                if let Some(limit) = bodylimit {
                    if body.len() as u64 > limit {
                        return Err(HttpError::limit("body"));
                    }
                }
            }
            DecodedItem::Trailer(trailer) => {
                response.headers.update(&trailer, true);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    /// An in-memory transport: reads come from a fixed script of chunks, writes are recorded.
    struct ScriptedTransport {
        chunks: std::collections::VecDeque<Vec<u8>>,
        pub written: Vec<u8>,
    }

    impl ScriptedTransport {
        fn new(chunks: Vec<&[u8]>) -> Self {
            ScriptedTransport {
                chunks: chunks.into_iter().map(|c| c.to_vec()).collect(),
                written: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn peer_name(&self) -> String {
            "test".to_string()
        }
    }

    impl AsyncRead for ScriptedTransport {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if let Some(chunk) = self.chunks.pop_front() {
                buf.put_slice(&chunk);
            }
            Poll::Ready(Ok(()))
        }
    }

    impl tokio::io::AsyncWrite for ScriptedTransport {
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
    async fn plain_body_round_trip() {
        let transport = ScriptedTransport::new(vec![b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nHello world"]);
        let mut client = Client::new(transport);
        let mut request = Request::new("GET", b"/".to_vec(), (1, 1));
        let response = client.make_request(&mut request).await.unwrap();
        assert_eq!(response.code, 200);
        assert_eq!(response.body, b"Hello world");
    }

    #[tokio::test]
    async fn head_response_has_empty_body() {
        let transport =
            ScriptedTransport::new(vec![b"HTTP/1.1 200 OK\r\nContent-Length: 99\r\n\r\n"]);
        let mut client = Client::new(transport);
        let mut request = Request::new("HEAD", b"/".to_vec(), (1, 1));
        let response = client.make_request(&mut request).await.unwrap();
        assert_eq!(response.code, 200);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn body_limit_violation_is_a_limit_error() {
        let transport = ScriptedTransport::new(vec![
            b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nHello world",
        ]);
        let mut client = Client::new(transport);
        client.bodylimit = Some(5);
        let mut request = Request::new("GET", b"/".to_vec(), (1, 1));
        let err = client.make_request(&mut request).await.unwrap_err();
        assert!(matches!(err, HttpError::Limit { .. }));
    }

    #[tokio::test]
    async fn leftover_bytes_stay_pending_for_next_request() {
        let transport = ScriptedTransport::new(vec![
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhelloHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi",
        ]);
        let mut client = Client::new(transport);
        let mut first = Request::new("GET", b"/a".to_vec(), (1, 1));
        let r1 = client.make_request(&mut first).await.unwrap();
        assert_eq!(r1.body, b"hello");

        let mut second = Request::new("GET", b"/b".to_vec(), (1, 1));
        let r2 = client.make_request(&mut second).await.unwrap();
        assert_eq!(r2.body, b"hi");
    }
}
