/*
 * response.rs
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

//! Response value type and a restartable status-line+headers parser.

use bytes::BytesMut;

use crate::error::HttpError;
use crate::headers::{HeaderParser, Headers};
use crate::message::request::parse_version;
use crate::parser::{take_line, Cache, Parser};

#[derive(Debug, Clone)]
pub struct Response {
    pub version: (u8, u8),
    pub code: u16,
    pub phrase: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// The final URL after following any redirects; set by the Agent.
    pub url: Option<String>,
    /// Every URL visited while producing this response, oldest first; set by the Agent.
    pub urlchain: Vec<String>,
}

impl Response {
    pub fn new(code: u16) -> Self {
        Response {
            version: (1, 1),
            code,
            phrase: String::new(),
            headers: Headers::new(),
            body: Vec::new(),
            url: None,
            urlchain: Vec::new(),
        }
    }
}

enum State {
    Status,
    Headers,
}

pub struct ResponseParser {
    state: State,
    header_parser: HeaderParser,
    version: (u8, u8),
    code: u16,
    phrase: String,
    headers: Headers,
}

impl ResponseParser {
    pub fn new() -> Self {
        ResponseParser {
            state: State::Status,
            header_parser: HeaderParser::new(),
            version: (1, 1),
            code: 0,
            phrase: String::new(),
            headers: Headers::new(),
        }
    }

    fn parse_status_line(&mut self, line: &[u8]) -> Result<(), HttpError> {
        let text = std::str::from_utf8(line)
            .map_err(|_| HttpError::data("status line is not valid utf-8"))?;
        let mut parts = text.splitn(3, ' ');
        let version_str = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HttpError::data("missing http-version"))?;
        let code_str = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HttpError::data("missing status code"))?;
        let phrase = parts.next().unwrap_or("");

        self.version = parse_version(version_str)?;
        self.code = code_str
            .parse()
            .map_err(|_| HttpError::data("status code is not a decimal integer"))?;
        self.phrase = phrase.to_string();
        Ok(())
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for ResponseParser {
    type Item = Response;

    fn parse_raw(
        &mut self,
        cache: &mut Cache,
        mut data: BytesMut,
    ) -> Result<Option<Vec<Response>>, HttpError> {
        loop {
            let Some(line) = take_line(&mut data) else {
                cache.prepend(&data);
                return Ok(None);
            };
            match self.state {
                State::Status => {
                    if line.is_empty() {
                        continue;
                    }
                    self.parse_status_line(&line)?;
                    self.state = State::Headers;
                }
                State::Headers => {
                    let more = self.header_parser.parse_line(&mut self.headers, &line)?;
                    if !more {
                        cache.prepend(&data);
                        cache.mark_done();
                        let response = Response {
                            version: self.version,
                            code: self.code,
                            phrase: std::mem::take(&mut self.phrase),
                            headers: std::mem::take(&mut self.headers),
                            body: Vec::new(),
                            url: None,
                            urlchain: Vec::new(),
                        };
                        return Ok(Some(vec![response]));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_response() {
        let mut parser = ResponseParser::new();
        let mut cache = Cache::new();
        let items = parser
            .feed(
                &mut cache,
                b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nHello world",
            )
            .unwrap();
        let resp = &items[0];
        assert_eq!(resp.code, 200);
        assert_eq!(resp.phrase, "OK");
        assert_eq!(resp.version, (1, 1));
        assert_eq!(&cache.clear()[..], b"Hello world");
    }

    #[test]
    fn phrase_may_be_empty() {
        let mut parser = ResponseParser::new();
        let mut cache = Cache::new();
        let items = parser.feed(&mut cache, b"HTTP/1.0 204\r\n\r\n").unwrap();
        assert_eq!(items[0].code, 204);
        assert_eq!(items[0].phrase, "");
    }

    #[test]
    fn byte_by_byte_matches_whole_chunk() {
        let whole = b"HTTP/1.1 200 OK\r\nX-A: 1\r\nX-B: 2\r\n\r\n";

        let mut bulk_parser = ResponseParser::new();
        let mut bulk_cache = Cache::new();
        let bulk = bulk_parser.feed(&mut bulk_cache, whole).unwrap();

        let mut byte_parser = ResponseParser::new();
        let mut byte_cache = Cache::new();
        let mut produced = Vec::new();
        for b in whole {
            produced.extend(byte_parser.feed(&mut byte_cache, &[*b]).unwrap());
        }

        assert_eq!(bulk[0].code, produced[0].code);
        assert_eq!(
            bulk[0].headers.get("X-A"),
            produced[0].headers.get("X-A")
        );
        assert_eq!(
            bulk[0].headers.get("X-B"),
            produced[0].headers.get("X-B")
        );
    }

    #[test]
    fn rejects_non_integer_status_code() {
        let mut parser = ResponseParser::new();
        let mut cache = Cache::new();
        assert!(parser.feed(&mut cache, b"HTTP/1.1 OK OK\r\n\r\n").is_err());
    }
}
