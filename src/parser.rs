/*
 * parser.rs
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

//! Incremental, feed-driven parsing primitives.
//!
//! Every higher-level parser (request/response start-line+headers, chunked framing) is built on
//! top of [`Cache`] and [`Parser`]: bytes arrive in arbitrary fragments, get appended to a cache,
//! and a parser drains what it can, restoring anything it can't yet use.

use bytes::BytesMut;

use crate::error::HttpError;

/// The byte cache shared by every [`Parser`] implementation.
///
/// `done` latches once a parser has produced its terminal item (or a decoder has reached the end
/// of its frame); once set, [`Cache::clear`] hands back whatever arrived after the message so the
/// next consumer can pick up exactly where this one left off.
#[derive(Default)]
pub struct Cache {
    buf: BytesMut,
    done: bool,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Restore bytes a `parse_raw` call could not yet use, putting them back in front of
    /// whatever is already cached.
    pub fn prepend(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut merged = BytesMut::with_capacity(data.len() + self.buf.len());
        merged.extend_from_slice(data);
        merged.extend_from_slice(&self.buf);
        self.buf = merged;
    }

    /// Take everything currently buffered, leaving the cache empty.
    pub fn take(&mut self) -> BytesMut {
        std::mem::take(&mut self.buf)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Bytes left over after the owning parser finished — the start of whatever follows.
    pub fn clear(&mut self) -> BytesMut {
        std::mem::take(&mut self.buf)
    }
}

/// A restartable parser driven by repeated [`Parser::feed`] calls.
///
/// Implementations provide `parse_raw`, which is handed the entire current cache contents and
/// must either consume what it can (restoring any unconsumed remainder into `cache` itself) or
/// signal that it needs more bytes by returning `Ok(None)` after restoring `data` unchanged.
pub trait Parser {
    type Item;

    fn parse_raw(
        &mut self,
        cache: &mut Cache,
        data: BytesMut,
    ) -> Result<Option<Vec<Self::Item>>, HttpError>;

    /// Append `data` to the cache and drain it through `parse_raw` until the cache is empty,
    /// parsing is blocked on more bytes, or the parser is done.
    fn feed(&mut self, cache: &mut Cache, data: &[u8]) -> Result<Vec<Self::Item>, HttpError> {
        cache.feed(data);
        let mut out = Vec::new();
        while !cache.is_empty() && !cache.is_done() {
            let chunk = cache.take();
            match self.parse_raw(cache, chunk)? {
                Some(items) => out.extend(items),
                None => break,
            }
        }
        Ok(out)
    }

    /// Called when the transport has no more bytes to offer. The default marks the cache done
    /// and produces nothing; decoders that track an expected length override this to raise a
    /// data error if the frame was incomplete.
    fn finish(&mut self, cache: &mut Cache) -> Result<Vec<Self::Item>, HttpError> {
        cache.mark_done();
        Ok(Vec::new())
    }
}

/// Remove and return the next LF-terminated line from the front of `buf`, without the trailing
/// delimiter (a preceding CR, if present, is stripped too). Leaves `buf` holding whatever follows
/// the delimiter. Returns `None` if no complete line is buffered yet.
pub(crate) fn take_line(buf: &mut BytesMut) -> Option<Vec<u8>> {
    let pos = memchr::memchr(b'\n', buf)?;
    let mut line = buf.split_to(pos + 1);
    line.truncate(line.len() - 1);
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    Some(line.to_vec())
}
