/*
 * chunked.rs
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

use bytes::BytesMut;

use crate::body::DecodedItem;
use crate::error::HttpError;
use crate::headers::{HeaderParser, Headers};
use crate::parser::{take_line, Cache, Parser};

enum State {
    SizeLine,
    ChunkData(usize),
    AfterChunkData,
    TrailerHeaders,
}

/// Decodes `Transfer-Encoding: chunked` framing: a size line, that many bytes of data, a
/// terminating CRLF, repeated until a zero-sized chunk, followed by optional trailer headers.
///
/// Trailer headers (if any) are emitted as a single [`DecodedItem::Trailer`] after the last data
/// chunk, never folded into the data stream.
pub struct ChunkedDecoder {
    state: State,
    header_parser: HeaderParser,
    trailer: Headers,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        ChunkedDecoder {
            state: State::SizeLine,
            header_parser: HeaderParser::new(),
            trailer: Headers::new(),
        }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, HttpError> {
    let hex = line
        .split(|&b| b == b';')
        .next()
        .unwrap_or(line);
    let text = std::str::from_utf8(hex)
        .map_err(|_| HttpError::data("chunk size is not valid utf-8"))?
        .trim();
    usize::from_str_radix(text, 16).map_err(|_| HttpError::data("malformed chunk size"))
}

impl Parser for ChunkedDecoder {
    type Item = DecodedItem;

    fn parse_raw(
        &mut self,
        cache: &mut Cache,
        mut data: BytesMut,
    ) -> Result<Option<Vec<DecodedItem>>, HttpError> {
        let mut out = Vec::new();
        loop {
            match self.state {
                State::SizeLine => {
                    let Some(line) = take_line(&mut data) else {
                        cache.prepend(&data);
                        return Ok(if out.is_empty() { None } else { Some(out) });
                    };
                    let size = parse_chunk_size(&line)?;
                    self.state = if size == 0 {
                        State::TrailerHeaders
                    } else {
                        State::ChunkData(size)
                    };
                }
                State::ChunkData(remaining) => {
                    if data.is_empty() {
                        cache.prepend(&data);
                        return Ok(if out.is_empty() { None } else { Some(out) });
                    }
                    let take = remaining.min(data.len());
                    let chunk = data.split_to(take);
                    let left = remaining - take;
                    self.state = if left == 0 {
                        State::AfterChunkData
                    } else {
                        State::ChunkData(left)
                    };
                    out.push(DecodedItem::Data(chunk.freeze()));
                }
                State::AfterChunkData => {
                    let Some(line) = take_line(&mut data) else {
                        cache.prepend(&data);
                        return Ok(if out.is_empty() { None } else { Some(out) });
                    };
                    if !line.is_empty() {
                        return Err(HttpError::data("chunk data must end with CRLF"));
                    }
                    self.state = State::SizeLine;
                }
                State::TrailerHeaders => {
                    let Some(line) = take_line(&mut data) else {
                        cache.prepend(&data);
                        return Ok(if out.is_empty() { None } else { Some(out) });
                    };
                    let more = self.header_parser.parse_line(&mut self.trailer, &line)?;
                    if !more {
                        cache.prepend(&data);
                        cache.mark_done();
                        out.push(DecodedItem::Trailer(std::mem::take(&mut self.trailer)));
                        return Ok(Some(out));
                    }
                }
            }
        }
    }

    fn finish(&mut self, cache: &mut Cache) -> Result<Vec<DecodedItem>, HttpError> {
        cache.mark_done();
        Err(HttpError::data(
            "connection closed with an incomplete chunked body",
        ))
    }
}
