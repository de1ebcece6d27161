/*
 * request.rs
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

//! Request value type, serialisation, and a restartable request-line+headers parser.

use bytes::BytesMut;
use tokio::io::AsyncRead;

use crate::error::HttpError;
use crate::headers::{HeaderParser, Headers};
use crate::parser::{take_line, Cache, Parser};

/// A request body: either a single in-memory buffer or a readable byte source (e.g. an open
/// file), sent in bounded chunks so large uploads don't need to be buffered whole.
pub enum Body {
    Bytes(Vec<u8>),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl Body {
    pub fn is_empty_bytes(&self) -> bool {
        matches!(self, Body::Bytes(b) if b.is_empty())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Bytes(s.as_bytes().to_vec())
    }
}

pub struct Request {
    pub method: String,
    /// Origin-form path, absolute-URI (non-tunneling proxy), or `host:port` authority (CONNECT).
    pub target: Vec<u8>,
    pub version: (u8, u8),
    pub headers: Headers,
    pub body: Option<Body>,
}

impl Request {
    pub fn new(method: impl Into<String>, target: Vec<u8>, version: (u8, u8)) -> Self {
        Request {
            method: method.into(),
            target,
            version,
            headers: Headers::new(),
            body: None,
        }
    }

    /// Serialise the request line and headers (not the body) onto `out`.
    pub fn write_head(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        for &b in &self.target {
            out.push(if b == b' ' { b'+' } else { b });
        }
        out.push(b' ');
        out.extend_from_slice(format!("HTTP/{}.{}", self.version.0, self.version.1).as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.headers.to_lines().as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}

enum State {
    Command,
    Headers,
}

/// Parses `METHOD target HTTP/M.N` followed by a header block, tolerating leading blank lines
/// before the request line (RFC 2616 §4.1).
pub struct RequestParser {
    state: State,
    header_parser: HeaderParser,
    method: String,
    target: Vec<u8>,
    version: (u8, u8),
    headers: Headers,
}

impl RequestParser {
    pub fn new() -> Self {
        RequestParser {
            state: State::Command,
            header_parser: HeaderParser::new(),
            method: String::new(),
            target: Vec::new(),
            version: (1, 1),
            headers: Headers::new(),
        }
    }

    fn parse_command_line(&mut self, line: &[u8]) -> Result<(), HttpError> {
        let text = std::str::from_utf8(line)
            .map_err(|_| HttpError::data("request line is not valid utf-8"))?;
        let mut parts = text.splitn(3, ' ');
        let method = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HttpError::data("missing method"))?;
        let target = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HttpError::data("missing request-target"))?;
        let version_str = parts
            .next()
            .ok_or_else(|| HttpError::data("missing http-version"))?;
        let version = parse_version(version_str)?;

        self.method = method.to_string();
        self.target = target.as_bytes().to_vec();
        self.version = version;
        Ok(())
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for RequestParser {
    type Item = Request;

    fn parse_raw(
        &mut self,
        cache: &mut Cache,
        mut data: BytesMut,
    ) -> Result<Option<Vec<Request>>, HttpError> {
        loop {
            let Some(line) = take_line(&mut data) else {
                cache.prepend(&data);
                return Ok(None);
            };
            match self.state {
                State::Command => {
                    if line.is_empty() {
                        continue;
                    }
                    self.parse_command_line(&line)?;
                    self.state = State::Headers;
                }
                State::Headers => {
                    let more = self.header_parser.parse_line(&mut self.headers, &line)?;
                    if !more {
                        cache.prepend(&data);
                        cache.mark_done();
                        let request = Request {
                            method: std::mem::take(&mut self.method),
                            target: std::mem::take(&mut self.target),
                            version: self.version,
                            headers: std::mem::take(&mut self.headers),
                            body: None,
                        };
                        return Ok(Some(vec![request]));
                    }
                }
            }
        }
    }
}

pub(crate) fn parse_version(text: &str) -> Result<(u8, u8), HttpError> {
    let rest = text
        .strip_prefix("HTTP/")
        .ok_or_else(|| HttpError::data("malformed http-version"))?;
    let (major, minor) = rest
        .split_once('.')
        .ok_or_else(|| HttpError::data("malformed http-version"))?;
    let major: u8 = major
        .parse()
        .map_err(|_| HttpError::data("malformed http-version"))?;
    let minor: u8 = minor
        .parse()
        .map_err(|_| HttpError::data("malformed http-version"))?;
    Ok((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_request() {
        let mut parser = RequestParser::new();
        let mut cache = Cache::new();
        let items = parser
            .feed(&mut cache, b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .unwrap();
        let req = &items[0];
        assert_eq!(req.method, "GET");
        assert_eq!(req.target, b"/index.html");
        assert_eq!(req.version, (1, 1));
        assert_eq!(req.headers.get("Host"), Some("example.com".to_string()));
    }

    #[test]
    fn tolerates_leading_blank_lines() {
        let mut parser = RequestParser::new();
        let mut cache = Cache::new();
        let items = parser
            .feed(&mut cache, b"\r\n\r\nGET / HTTP/1.0\r\n\r\n")
            .unwrap();
        assert_eq!(items[0].method, "GET");
    }

    #[test]
    fn feeds_byte_at_a_time() {
        let mut parser = RequestParser::new();
        let mut cache = Cache::new();
        let whole = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let mut produced = Vec::new();
        for b in whole {
            produced.extend(parser.feed(&mut cache, &[*b]).unwrap());
        }
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].method, "GET");
    }

    #[test]
    fn rejects_malformed_version() {
        let mut parser = RequestParser::new();
        let mut cache = Cache::new();
        assert!(parser.feed(&mut cache, b"GET / HTTP/x\r\n\r\n").is_err());
    }
}
