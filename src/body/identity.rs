/*
 * identity.rs
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
use crate::parser::{Cache, Parser};

/// Forwards bytes verbatim. With a known length it counts down to zero and marks itself done;
/// with `None` it never completes on its own — the caller must detect end-of-stream itself and
/// call [`Parser::finish`], which for this decoder is success rather than a data error.
pub struct IdentityDecoder {
    remaining: Option<u64>,
}

impl IdentityDecoder {
    pub fn new(length: Option<u64>) -> Self {
        IdentityDecoder { remaining: length }
    }
}

impl Parser for IdentityDecoder {
    type Item = DecodedItem;

    fn parse_raw(
        &mut self,
        cache: &mut Cache,
        mut data: BytesMut,
    ) -> Result<Option<Vec<DecodedItem>>, HttpError> {
        match self.remaining {
            None => {
                if data.is_empty() {
                    return Ok(Some(vec![]));
                }
                Ok(Some(vec![DecodedItem::Data(data.freeze())]))
            }
            Some(n) => {
                let take = (n as usize).min(data.len());
                let chunk = data.split_to(take);
                self.remaining = Some(n - take as u64);
                if !data.is_empty() {
                    cache.prepend(&data);
                }
                if self.remaining == Some(0) {
                    cache.mark_done();
                }
                Ok(Some(vec![DecodedItem::Data(chunk.freeze())]))
            }
        }
    }

    fn finish(&mut self, cache: &mut Cache) -> Result<Vec<DecodedItem>, HttpError> {
        cache.mark_done();
        match self.remaining {
            None | Some(0) => Ok(Vec::new()),
            Some(_) => Err(HttpError::data(
                "connection closed with an incomplete identity body",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_of(items: &[DecodedItem]) -> Vec<u8> {
        items
            .iter()
            .flat_map(|i| match i {
                DecodedItem::Data(b) => b.to_vec(),
                DecodedItem::Trailer(_) => panic!("unexpected trailer"),
            })
            .collect()
    }

    #[test]
    fn known_length_completes_at_zero() {
        let mut decoder = IdentityDecoder::new(Some(5));
        let mut cache = Cache::new();
        let items = decoder.feed(&mut cache, b"hello world").unwrap();
        assert_eq!(data_of(&items), b"hello");
        assert!(cache.is_done());
        assert_eq!(&cache.clear()[..], b" world");
    }

    #[test]
    fn unknown_length_forwards_until_finish() {
        let mut decoder = IdentityDecoder::new(None);
        let mut cache = Cache::new();
        let items = decoder.feed(&mut cache, b"chunk one").unwrap();
        assert_eq!(data_of(&items), b"chunk one");
        assert!(!cache.is_done());
        assert!(decoder.finish(&mut cache).unwrap().is_empty());
        assert!(cache.is_done());
    }

    #[test]
    fn finish_before_length_reached_is_data_error() {
        let mut decoder = IdentityDecoder::new(Some(10));
        let mut cache = Cache::new();
        decoder.feed(&mut cache, b"short").unwrap();
        assert!(decoder.finish(&mut cache).is_err());
    }
}
