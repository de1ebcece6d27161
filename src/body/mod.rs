/*
 * mod.rs
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

//! Body transfer-decoding pipeline: identity, chunked, deflate, and the compound chain that
//! threads raw socket bytes through whichever of those a response calls for.

mod chunked;
mod compound;
mod deflate;
mod identity;

pub use chunked::ChunkedDecoder;
pub use compound::CompoundDecoder;
pub use deflate::DeflateDecoder;
pub use identity::IdentityDecoder;

use bytes::Bytes;

use crate::headers::Headers;

/// One item out of a body decoder's output stream: either application-body bytes, or — only
/// ever from a [`ChunkedDecoder`] — the trailer headers that followed the terminating chunk.
/// Keeping this a distinct variant rather than inspecting byte contents means trailers can never
/// be mistaken for body data.
#[derive(Debug)]
pub enum DecodedItem {
    Data(Bytes),
    Trailer(Headers),
}
