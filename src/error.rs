/*
 * error.rs
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

use std::io;

use thiserror::Error;

/// Every failure the engine can produce, from malformed wire data to policy limits.
///
/// This is the single error type returned by every fallible public function; callers match on
/// the variant instead of catching distinct exception types.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("dns resolution failed for {host}: {source}")]
    Dns {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed http data: {0}")]
    Data(String),

    #[error("{what} limit exceeded")]
    Limit { what: &'static str },

    #[error("operation timed out")]
    Timeout,

    #[error("proxy refused CONNECT: {code} {phrase}")]
    ProxyRefused { code: u16, phrase: String },

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("tls error: {0}")]
    Tls(String),
}

impl HttpError {
    pub fn data(message: impl Into<String>) -> Self {
        HttpError::Data(message.into())
    }

    pub fn limit(what: &'static str) -> Self {
        HttpError::Limit { what }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        HttpError::Protocol(message.into())
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;
