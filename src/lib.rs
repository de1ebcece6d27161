/*
 * lib.rs
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

//! A low-level client-side HTTP/1.x engine: incremental message parsing, a composable body
//! transfer-decoding pipeline, and connection orchestration (proxying, `CONNECT` tunneling,
//! redirects, keep-alive) over a pluggable byte-stream transport.
//!
//! Most callers want [`Agent`]: construct one with [`AgentOptions`], call
//! [`Agent::make_request`] with a URL. Lower layers ([`Client`], [`ProxyClient`], the parsers
//! and decoders in [`parser`] and [`body`]) are exposed for building custom transports or
//! decoders on top of the same primitives.

pub mod agent;
pub mod body;
pub mod client;
pub mod error;
pub mod headers;
pub mod message;
pub mod parser;
pub mod proxy;
pub mod transport;
pub mod url;

pub use agent::{Agent, AgentOptions, Connector, RequestOptions};
pub use client::Client;
pub use error::{HttpError, Result};
pub use headers::Headers;
pub use message::{Request, Response};
pub use message::request::Body;
pub use parser::Parser;
pub use proxy::ProxyClient;
pub use transport::{Socket, Transport};
