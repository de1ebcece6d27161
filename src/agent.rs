/*
 * agent.rs
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

//! Connection-caching, proxying, and redirect-following orchestration on top of [`Client`].

use std::time::Duration;

use crate::client::Client;
use crate::error::HttpError;
use crate::headers::Headers;
use crate::message::request::Body;
use crate::message::{Request, Response};
use crate::proxy::ProxyClient;
use crate::transport::{BoxedTransport, Socket};
use crate::url;

/// The connection-cache key: one entry for a direct or plain-proxied connection, two when
/// tunneling (`[proxy, target]`), mirroring the `((scheme, netloc), ...)` tuple the cache was
/// originally keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnKey(Vec<(String, String)>);

/// Constructor options for [`Agent`], grouped into one typed struct rather than positional
/// parameters.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub proxy: Option<String>,
    pub headers: Headers,
    pub timeout: Duration,
    /// `None` means "decide per response version" (the default); `Some` pins the policy.
    pub keepalive: Option<bool>,
    pub sizelimit: Option<i64>,
    pub bodylimit: Option<u64>,
    pub redirectlimit: u32,
}

impl Default for AgentOptions {
    fn default() -> Self {
        AgentOptions {
            proxy: None,
            headers: Headers::new(),
            timeout: Duration::from_secs(30),
            keepalive: None,
            sizelimit: None,
            bodylimit: None,
            redirectlimit: 20,
        }
    }
}

/// Per-call overrides layered on top of [`AgentOptions`] defaults.
#[derive(Default)]
pub struct RequestOptions {
    pub method: Option<String>,
    pub version: Option<(u8, u8)>,
    pub headers: Headers,
    pub body: Option<Body>,
    pub referer: Option<String>,
}

/// Tracks one cached connection and follows redirects across calls to [`Agent::make_request`].
///
/// Concurrency note: like [`Client`], an `Agent` serialises requests on its single cached
/// connection via `&mut self`; callers wanting concurrent requests use separate `Agent`s.
pub struct Agent {
    options: AgentOptions,
    current_address: Option<ConnKey>,
    current_client: Option<Client<BoxedTransport>>,
}

impl Agent {
    pub fn new(options: AgentOptions) -> Self {
        Agent {
            options,
            current_address: None,
            current_client: None,
        }
    }

    /// Drop the cached connection, if any.
    pub fn close(&mut self) {
        if self.current_client.is_some() {
            log::debug!("closing cached connection");
        }
        self.current_address = None;
        self.current_client = None;
    }

    /// Follow redirects (301, 302, 303, 307) up to `redirectlimit` hops, coercing the method to
    /// `GET` and dropping the body on each hop, per the fixed header-strip set.
    pub async fn make_request(
        &mut self,
        url: &str,
        mut options: RequestOptions,
    ) -> Result<Response, HttpError> {
        let mut current_url = url.trim().to_string();
        let mut urlchain = Vec::new();
        let mut redirects_left = self.options.redirectlimit;

        loop {
            urlchain.push(current_url.clone());
            let mut response = self.make_request_once(&current_url, &mut options).await?;

            if matches!(response.code, 301 | 302 | 303 | 307) {
                let location = response
                    .headers
                    .getlist("Location")
                    .first()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                if let Some(location) = location {
                    if redirects_left == 0 {
                        return Err(HttpError::TooManyRedirects);
                    }
                    redirects_left -= 1;
                    let next_url = url::resolve(&current_url, &location)?;
                    log::debug!(
                        "redirect {current_url} -> {next_url} ({redirects_left} hops remaining)"
                    );
                    strip_redirect_headers(&mut options.headers);
                    options.method = Some("GET".to_string());
                    options.body = None;
                    options.referer = Some(current_url.clone());
                    current_url = next_url;
                    continue;
                }
            }

            response.url = Some(current_url);
            response.urlchain = urlchain;
            return Ok(response);
        }
    }

    async fn make_request_once(
        &mut self,
        url_str: &str,
        options: &mut RequestOptions,
    ) -> Result<Response, HttpError> {
        let parsed = url::parse_uri(url_str)?;
        let scheme = parsed.scheme.to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(HttpError::UnsupportedScheme(scheme));
        }

        let target_path = if parsed.path.is_empty() {
            "/".to_string()
        } else {
            parsed.path.clone()
        };
        let method = options.method.clone().unwrap_or_else(|| "GET".to_string());
        let version = options.version.unwrap_or((1, 1));

        let mut request = Request::new(method, target_path.into_bytes(), version);
        request.headers.update(&self.options.headers, false);
        request.headers.update(&options.headers, false);
        request.body = options.body.take();

        if let Some(auth) = &parsed.auth {
            request
                .headers
                .set("Authorization", format!("Basic {}", url::basic_credential(auth)));
        }
        if !parsed.netloc.is_empty() {
            request.headers.set("Host", parsed.netloc.clone());
        }
        if let Some(referer) = &options.referer {
            request.headers.set("Referer", referer.clone());
        }
        if let Some(keepalive) = self.options.keepalive {
            request
                .headers
                .set("Connection", if keepalive { "keep-alive" } else { "close" });
        }

        let proxy_info = match &self.options.proxy {
            Some(proxy_url) => Some(parse_proxy(proxy_url)?),
            None => None,
        };
        let use_tunnel = proxy_info
            .as_ref()
            .map(|(proxy_scheme, ..)| scheme == "https" || proxy_scheme == "https")
            .unwrap_or(false);

        let address = match &proxy_info {
            Some((proxy_scheme, proxy_netloc, _)) if use_tunnel => ConnKey(vec![
                (proxy_scheme.clone(), proxy_netloc.clone()),
                (scheme.clone(), parsed.netloc.clone()),
            ]),
            Some((proxy_scheme, proxy_netloc, _)) => {
                ConnKey(vec![(proxy_scheme.clone(), proxy_netloc.clone())])
            }
            None => ConnKey(vec![(scheme.clone(), parsed.netloc.clone())]),
        };

        if let Some((_, _, proxy_auth)) = &proxy_info {
            if !use_tunnel {
                request.target = url_str.as_bytes().to_vec();
                if let Some(auth) = proxy_auth {
                    request.headers.set(
                        "Proxy-Authorization",
                        format!("Basic {}", url::basic_credential(auth)),
                    );
                }
            }
        }

        if self.current_address.as_ref() != Some(&address) {
            self.close();
        }

        if self.current_client.is_none() {
            log::debug!("opening new connection for {address:?}");
            let dial = tokio::time::timeout(
                self.options.timeout,
                connect_address(
                    self.options.proxy.as_deref(),
                    &self.options.headers,
                    &scheme,
                    &parsed.netloc,
                ),
            )
            .await
            .map_err(|_| HttpError::Timeout)?;
            let (transport, _tunneling) = dial?;
            let mut client = Client::new(transport);
            client.sizelimit = self.options.sizelimit;
            client.bodylimit = self.options.bodylimit;
            self.current_client = Some(client);
            self.current_address = Some(address);
        } else {
            log::debug!("reusing cached connection for {:?}", self.current_address);
            let client = self.current_client.as_mut().expect("checked above");
            client.sizelimit = self.options.sizelimit;
            client.bodylimit = self.options.bodylimit;
        }

        let client = self.current_client.as_mut().expect("connection just established");
        let response = match tokio::time::timeout(self.options.timeout, client.make_request(&mut request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                log::warn!("closing cached connection after request error: {err}");
                self.close();
                return Err(err);
            }
            Err(_) => {
                log::warn!("closing cached connection after request timeout");
                self.close();
                return Err(HttpError::Timeout);
            }
        };

        let mut keepalive_after = response.version >= (1, 1);
        if let Some(connection) = response.headers.get("Connection") {
            let tokens: Vec<String> = connection
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .collect();
            if tokens.iter().any(|t| t == "keep-alive") {
                keepalive_after = true;
            }
            if tokens.iter().any(|t| t == "close") {
                keepalive_after = false;
            }
        }
        if !keepalive_after || self.options.keepalive == Some(false) {
            self.close();
        }

        Ok(response)
    }
}

/// Headers stripped from a forwarded redirect: hop-specific and entity headers that don't carry
/// over to a (possibly cross-origin) `GET` on the new location, plus every conditional-request
/// header.
fn strip_redirect_headers(headers: &mut Headers) {
    for name in [
        "Transfer-Encoding",
        "Content-Length",
        "Content-Range",
        "Content-Type",
        "Authorization",
        "Referer",
        "Expect",
        "Range",
        "Host",
    ] {
        headers.pop(name);
    }
    let conditional: Vec<String> = headers
        .iter()
        .map(|(n, _)| n.to_string())
        .filter(|n| n.to_ascii_lowercase().starts_with("if-"))
        .collect();
    for name in conditional {
        headers.pop(&name);
    }
}

fn parse_proxy(proxy_url: &str) -> Result<(String, String, Option<String>), HttpError> {
    let parsed = url::parse_uri(proxy_url)?;
    let scheme = parsed.scheme.to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(HttpError::UnsupportedScheme(scheme));
    }
    Ok((scheme, parsed.netloc, parsed.auth))
}

/// Connect (optionally through an HTTP(S) proxy, tunneling if either endpoint is HTTPS) to
/// `target_scheme://target_netloc`, returning the resulting transport and whether a `CONNECT`
/// tunnel was established. Shared by [`Agent`] and [`Connector`].
async fn connect_address(
    proxy: Option<&str>,
    proxy_request_headers: &Headers,
    target_scheme: &str,
    target_netloc: &str,
) -> Result<(BoxedTransport, bool), HttpError> {
    if target_scheme != "http" && target_scheme != "https" {
        return Err(HttpError::UnsupportedScheme(target_scheme.to_string()));
    }
    let target_default_port = if target_scheme == "https" { 443 } else { 80 };
    let (target_host, target_port) = url::parse_netloc(target_netloc, target_default_port);

    let Some(proxy_url) = proxy else {
        let mut socket = Socket::connect(&target_host, target_port).await?;
        if target_scheme == "https" {
            socket = socket.upgrade_tls(&target_host).await?;
        }
        let boxed: BoxedTransport = Box::new(socket);
        return Ok((boxed, false));
    };

    let (proxy_scheme, proxy_netloc, proxy_auth) = parse_proxy(proxy_url)?;
    let proxy_default_port = if proxy_scheme == "https" { 443 } else { 80 };
    let (proxy_host, proxy_port) = url::parse_netloc(&proxy_netloc, proxy_default_port);
    let use_tunnel = target_scheme == "https" || proxy_scheme == "https";

    if !use_tunnel {
        let socket = Socket::connect(&proxy_host, proxy_port).await?;
        let boxed: BoxedTransport = Box::new(socket);
        return Ok((boxed, false));
    }

    let mut socket = Socket::connect(&proxy_host, proxy_port).await?;
    if proxy_scheme == "https" {
        socket = socket.upgrade_tls(&proxy_host).await?;
    }
    let mut proxy_client = ProxyClient::new(socket);
    let mut proxy_headers = proxy_request_headers.clone();
    if let Some(auth) = &proxy_auth {
        proxy_headers.set(
            "Proxy-Authorization",
            format!("Basic {}", url::basic_credential(auth)),
        );
    }
    proxy_client
        .connect(&target_host, target_port, &proxy_headers)
        .await?;
    let mut socket = proxy_client.into_inner();
    if target_scheme == "https" {
        socket = socket.upgrade_tls(&target_host).await?;
    }
    let boxed: BoxedTransport = Box::new(socket);
    Ok((boxed, true))
}

/// Thin wrapper exposing the same connect-through-proxy-and-optionally-tunnel machinery as
/// [`Agent`], but returning the raw (possibly tunneled, possibly TLS-wrapped) transport instead
/// of driving a request over it.
pub struct Connector {
    proxy: Option<String>,
    headers: Headers,
    timeout: Duration,
}

impl Connector {
    pub fn new(proxy: Option<String>, headers: Headers, timeout: Duration) -> Self {
        Connector {
            proxy,
            headers,
            timeout,
        }
    }

    pub async fn connect(&self, host: &str, port: u16, ssl: bool) -> Result<BoxedTransport, HttpError> {
        let scheme = if ssl { "https" } else { "http" };
        let netloc = format!("{host}:{port}");
        let dial = tokio::time::timeout(
            self.timeout,
            connect_address(self.proxy.as_deref(), &self.headers, scheme, &netloc),
        )
        .await
        .map_err(|_| HttpError::Timeout)?;
        let (transport, _tunneling) = dial?;
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_redirect_headers_removes_fixed_set_and_conditionals() {
        let mut headers = Headers::new();
        headers.add("Authorization", "Basic xyz");
        headers.add("Content-Length", "5");
        headers.add("If-None-Match", "\"abc\"");
        headers.add("X-Custom", "keep-me");
        strip_redirect_headers(&mut headers);
        assert!(!headers.contains("Authorization"));
        assert!(!headers.contains("Content-Length"));
        assert!(!headers.contains("If-None-Match"));
        assert!(headers.contains("X-Custom"));
    }

    #[test]
    fn parse_proxy_rejects_unsupported_scheme() {
        assert!(parse_proxy("ftp://proxy.example.com").is_err());
    }

    #[test]
    fn agent_options_default_matches_documented_defaults() {
        let options = AgentOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.redirectlimit, 20);
        assert_eq!(options.keepalive, None);
        assert_eq!(options.sizelimit, None);
        assert_eq!(options.bodylimit, None);
    }
}
