/*
 * deflate.rs
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
use flate2::{Decompress, FlushDecompress, Status};

use crate::body::DecodedItem;
use crate::error::HttpError;
use crate::parser::{Cache, Parser};

/// Pushes bytes through a raw deflate/zlib stream. Bytes that arrive after the stream ends
/// (`unused_data`, in zlib terms) are handed back to the cache rather than dropped, so whatever
/// follows the compressed payload isn't lost.
pub struct DeflateDecoder {
    inner: Decompress,
    done: bool,
}

impl DeflateDecoder {
    /// `zlib_header = true` matches the zlib-wrapped deflate stream most servers send for
    /// `Content-Encoding`/`Transfer-Encoding: deflate` in practice.
    pub fn new() -> Self {
        DeflateDecoder {
            inner: Decompress::new(true),
            done: false,
        }
    }

    fn drain(&mut self, mut input: &[u8], flush: FlushDecompress) -> Result<(Vec<u8>, usize), HttpError> {
        let mut output = Vec::new();
        let mut out_buf = vec![0u8; input.len().max(4096)];
        loop {
            let before_in = self.inner.total_in();
            let before_out = self.inner.total_out();
            let status = self
                .inner
                .decompress(input, &mut out_buf, flush)
                .map_err(|e| HttpError::data(format!("deflate stream error: {e}")))?;
            let consumed = (self.inner.total_in() - before_in) as usize;
            let produced = (self.inner.total_out() - before_out) as usize;
            output.extend_from_slice(&out_buf[..produced]);
            input = &input[consumed..];

            match status {
                Status::StreamEnd => {
                    self.done = true;
                    break;
                }
                _ if input.is_empty() && produced == 0 => break,
                _ if input.is_empty() => {
                    // drained the input but the decompressor may still hold buffered output
                    if produced == 0 {
                        break;
                    }
                }
                _ => {
                    if out_buf.len() < 1 << 20 {
                        out_buf.resize(out_buf.len() * 2, 0);
                    }
                }
            }
        }
        Ok((output, input.len()))
    }
}

impl Default for DeflateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for DeflateDecoder {
    type Item = DecodedItem;

    fn parse_raw(
        &mut self,
        cache: &mut Cache,
        data: BytesMut,
    ) -> Result<Option<Vec<DecodedItem>>, HttpError> {
        if data.is_empty() {
            return Ok(Some(vec![]));
        }
        let (output, leftover_len) = self.drain(&data, FlushDecompress::None)?;
        if leftover_len > 0 {
            let start = data.len() - leftover_len;
            cache.prepend(&data[start..]);
        }
        if self.done {
            cache.mark_done();
        }
        Ok(Some(vec![DecodedItem::Data(Bytes::from(output))]))
    }

    fn finish(&mut self, cache: &mut Cache) -> Result<Vec<DecodedItem>, HttpError> {
        if self.done {
            cache.mark_done();
            return Ok(Vec::new());
        }
        let (output, _) = self.drain(&[], FlushDecompress::Finish)?;
        self.done = true;
        cache.mark_done();
        if output.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![DecodedItem::Data(Bytes::from(output))])
        }
    }
}
