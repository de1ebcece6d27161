/*
 * compound.rs
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

use bytes::{Bytes, BytesMut};

use crate::body::{ChunkedDecoder, DecodedItem, DeflateDecoder, IdentityDecoder};
use crate::error::HttpError;
use crate::headers::Headers;
use crate::message::Response;
use crate::parser::{Cache, Parser};

/// A pipeline stage: the base framing decoder (identity or chunked) or a payload transform
/// (deflate). A tagged variant rather than a trait-object hierarchy, since the set of stages is
/// closed and each needs its own dispatch in [`CompoundDecoder`].
enum Stage {
    Identity(IdentityDecoder),
    Chunked(ChunkedDecoder),
    Deflate(DeflateDecoder),
}

impl Stage {
    fn parse_raw(
        &mut self,
        cache: &mut Cache,
        data: BytesMut,
    ) -> Result<Option<Vec<DecodedItem>>, HttpError> {
        match self {
            Stage::Identity(d) => d.parse_raw(cache, data),
            Stage::Chunked(d) => d.parse_raw(cache, data),
            Stage::Deflate(d) => d.parse_raw(cache, data),
        }
    }

    fn finish(&mut self, cache: &mut Cache) -> Result<Vec<DecodedItem>, HttpError> {
        match self {
            Stage::Identity(d) => d.finish(cache),
            Stage::Chunked(d) => d.finish(cache),
            Stage::Deflate(d) => d.finish(cache),
        }
    }
}

fn feed_stage(
    stage: &mut Stage,
    cache: &mut Cache,
    data: &[u8],
) -> Result<Vec<DecodedItem>, HttpError> {
    cache.feed(data);
    let mut out = Vec::new();
    while !cache.is_empty() && !cache.is_done() {
        let chunk = cache.take();
        match stage.parse_raw(cache, chunk)? {
            Some(items) => out.extend(items),
            None => break,
        }
    }
    Ok(out)
}

/// A chain of decoder stages: `stages[0]` is the base framing decoder that directly consumes
/// socket bytes; later stages are payload transforms applied to the base decoder's output.
/// Trailer-header items pass through untouched by any transform stage.
pub struct CompoundDecoder {
    stages: Vec<Stage>,
    caches: Vec<Cache>,
}

impl CompoundDecoder {
    pub fn empty() -> Self {
        CompoundDecoder {
            stages: Vec::new(),
            caches: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn push_front(&mut self, stage: Stage) {
        self.stages.insert(0, stage);
        self.caches.insert(0, Cache::new());
    }

    fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
        self.caches.push(Cache::new());
    }

    /// True once the base (first) decoder has completed; an empty chain is trivially done.
    pub fn is_done(&self) -> bool {
        self.caches.first().map(Cache::is_done).unwrap_or(true)
    }

    /// Push raw bytes through the chain. Once the base stage completes, remaining stages are
    /// flushed via `finish()` in the same call so buffered transform output isn't left stranded.
    pub fn parse(&mut self, data: &[u8]) -> Result<Vec<DecodedItem>, HttpError> {
        let mut current = vec![DecodedItem::Data(Bytes::copy_from_slice(data))];
        let mut base_done = false;
        for (i, (stage, cache)) in self.stages.iter_mut().zip(self.caches.iter_mut()).enumerate() {
            let mut next = Vec::new();
            for item in current {
                match item {
                    DecodedItem::Trailer(_) => next.push(item),
                    DecodedItem::Data(bytes) => next.extend(feed_stage(stage, cache, &bytes)?),
                }
            }
            if i == 0 {
                base_done = cache.is_done();
            }
            if base_done && i > 0 && !cache.is_done() {
                next.extend(stage.finish(cache)?);
            }
            current = next;
        }
        Ok(current)
    }

    /// Called on transport EOF when the base stage hasn't self-reported completion (the
    /// identity-until-close case). Flushes every stage in order.
    pub fn finish(&mut self) -> Result<Vec<DecodedItem>, HttpError> {
        let mut current = Vec::new();
        for (stage, cache) in self.stages.iter_mut().zip(self.caches.iter_mut()) {
            let mut next = Vec::new();
            for item in current {
                match item {
                    DecodedItem::Trailer(_) => next.push(item),
                    DecodedItem::Data(bytes) => next.extend(feed_stage(stage, cache, &bytes)?),
                }
            }
            if !cache.is_done() {
                next.extend(stage.finish(cache)?);
            }
            current = next;
        }
        Ok(current)
    }

    /// Bytes left over after the base decoder completed — the start of whatever follows the
    /// body on the wire.
    pub fn clear(&mut self) -> BytesMut {
        self.caches
            .first_mut()
            .map(Cache::clear)
            .unwrap_or_default()
    }

    /// Build the decoder chain for a response to `method`, per the framing rules driven by
    /// status code, `Content-Length`, and `Transfer-Encoding`.
    pub fn from_response(method: &str, response: &Response) -> Result<CompoundDecoder, HttpError> {
        if matches!(method, "HEAD" | "CONNECT") || matches!(response.code, 204 | 304) {
            return Ok(CompoundDecoder::empty());
        }

        let content_length = parse_content_length(&response.headers)?;
        if content_length == Some(0) {
            return Ok(CompoundDecoder::empty());
        }

        let mut tokens = parse_transfer_encoding(&response.headers)?;
        tokens.reverse();

        let mut decoder = CompoundDecoder::empty();
        for token in &tokens {
            match token.as_str() {
                "chunked" => {
                    if !decoder.is_empty() {
                        return Err(HttpError::data(
                            "transfer-encoding 'chunked' must be the last coding",
                        ));
                    }
                    decoder.push_front(Stage::Chunked(ChunkedDecoder::new()));
                }
                "identity" => {
                    if !decoder.is_empty() {
                        return Err(HttpError::data(
                            "transfer-encoding 'identity' must be the last coding",
                        ));
                    }
                    decoder.push_front(Stage::Identity(IdentityDecoder::new(content_length)));
                }
                "deflate" => decoder.push(Stage::Deflate(DeflateDecoder::new())),
                other => {
                    return Err(HttpError::data(format!(
                        "unsupported transfer-encoding: {other}"
                    )))
                }
            }
        }

        if decoder.is_empty() {
            decoder.push_front(Stage::Identity(IdentityDecoder::new(content_length)));
        }
        Ok(decoder)
    }
}

fn parse_content_length(headers: &Headers) -> Result<Option<u64>, HttpError> {
    let values = headers.getlist("Content-Length");
    let Some(last) = values.last() else {
        return Ok(None);
    };
    let trimmed = last.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| HttpError::data("invalid Content-Length"))
}

fn parse_transfer_encoding(headers: &Headers) -> Result<Vec<String>, HttpError> {
    let values = headers.getlist("Transfer-Encoding");
    if values.is_empty() {
        return Ok(Vec::new());
    }
    let joined = values.join(", ");
    Ok(joined
        .split(',')
        .map(|s| s.split(';').next().unwrap_or(s).trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(headers: &[(&str, &str)], code: u16) -> Response {
        let mut resp = Response::new(code);
        for (n, v) in headers {
            resp.headers.add(*n, *v);
        }
        resp
    }

    fn collect_data(items: Vec<DecodedItem>) -> Vec<u8> {
        items
            .into_iter()
            .filter_map(|i| match i {
                DecodedItem::Data(b) => Some(b.to_vec()),
                DecodedItem::Trailer(_) => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn head_response_has_no_body_regardless_of_content_length() {
        let resp = response_with(&[("Content-Length", "99")], 200);
        let decoder = CompoundDecoder::from_response("HEAD", &resp).unwrap();
        assert!(decoder.is_empty());
    }

    #[test]
    fn no_content_status_has_no_body() {
        let resp = response_with(&[], 204);
        let decoder = CompoundDecoder::from_response("GET", &resp).unwrap();
        assert!(decoder.is_empty());
    }

    #[test]
    fn zero_content_length_has_no_body() {
        let resp = response_with(&[("Content-Length", "0")], 200);
        let decoder = CompoundDecoder::from_response("GET", &resp).unwrap();
        assert!(decoder.is_empty());
    }

    #[test]
    fn identity_with_known_length() {
        let resp = response_with(&[("Content-Length", "5")], 200);
        let mut decoder = CompoundDecoder::from_response("GET", &resp).unwrap();
        let items = decoder.parse(b"hello").unwrap();
        assert_eq!(collect_data(items), b"hello");
        assert!(decoder.is_done());
    }

    #[test]
    fn chunked_wins_over_content_length() {
        let resp = response_with(
            &[("Content-Length", "999"), ("Transfer-Encoding", "chunked")],
            200,
        );
        let mut decoder = CompoundDecoder::from_response("GET", &resp).unwrap();
        let items = decoder.parse(b"5\r\nhello\r\n0\r\n\r\n").unwrap();
        assert_eq!(collect_data(items), b"hello");
        assert!(decoder.is_done());
    }

    #[test]
    fn chunked_not_last_is_an_error() {
        let resp = response_with(&[("Transfer-Encoding", "chunked, deflate")], 200);
        assert!(CompoundDecoder::from_response("GET", &resp).is_err());
    }

    #[test]
    fn unknown_coding_is_an_error() {
        let resp = response_with(&[("Transfer-Encoding", "gzip")], 200);
        assert!(CompoundDecoder::from_response("GET", &resp).is_err());
    }
}
