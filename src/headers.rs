/*
 * headers.rs
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

//! Insertion-ordered, case-insensitive HTTP header multimap.

use crate::error::HttpError;

fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// An ordered sequence of `(name, value)` pairs, looked up case-insensitively by name.
///
/// Global insertion order and original casing are preserved; lookups, removal, and assignment
/// are case-insensitive. This is a plain vector rather than a hash index because header sets are
/// small (single digits to low dozens of entries) and the per-name ordering `getlist` must
/// preserve is otherwise awkward to maintain across removals.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| same_name(n, name))
    }

    /// All values for `name`, in the order they were added.
    pub fn getlist(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| same_name(n, name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// All values for `name` joined by `", "`, or `None` if the header is absent.
    pub fn get(&self, name: &str) -> Option<String> {
        let values = self.getlist(name);
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// Append an entry, preserving any existing entries for the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remove all entries for `name` and append a single new entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(n, _)| !same_name(n, &name));
        self.entries.push((name, value.into()));
    }

    /// Remove and return all values for `name`, in insertion order.
    pub fn pop(&mut self, name: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|(n, v)| {
            if same_name(n, name) {
                removed.push(v.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Merge `other` in. With `merge=false`, the first value for each name replaces all existing
    /// entries for that name (like `set`); subsequent values for the same name within `other`
    /// are appended (like `add`), preserving `other`'s internal multi-value order. With
    /// `merge=true`, every value is appended without ever replacing.
    pub fn update(&mut self, other: &Headers, merge: bool) {
        if merge {
            for (n, v) in other.iter() {
                self.add(n.to_string(), v.to_string());
            }
            return;
        }
        let mut replaced: Vec<String> = Vec::new();
        for (n, v) in other.iter() {
            let lower = n.to_ascii_lowercase();
            if replaced.iter().any(|r| r == &lower) {
                self.add(n.to_string(), v.to_string());
            } else {
                self.set(n.to_string(), v.to_string());
                replaced.push(lower);
            }
        }
    }

    fn canonical_name(name: &str) -> String {
        name.split('-')
            .map(|part| {
                if part.eq_ignore_ascii_case("www") {
                    "WWW".to_string()
                } else {
                    let mut chars = part.chars();
                    match chars.next() {
                        Some(first) => {
                            first.to_ascii_uppercase().to_string()
                                + &chars.as_str().to_ascii_lowercase()
                        }
                        None => String::new(),
                    }
                }
            })
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Render as `Name: value\r\n` lines in canonical casing, in insertion order.
    pub fn to_lines(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.iter() {
            out.push_str(&Self::canonical_name(name));
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out
    }
}

/// Drives the header section of a request or response: feed it unfolded lines (one per call,
/// without the CRLF) until it reports end-of-headers.
#[derive(Default)]
pub struct HeaderParser {
    partial: Option<Vec<u8>>,
}

impl HeaderParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns `Ok(true)` while headers continue, `Ok(false)` once the blank line
    /// terminating the header section has been consumed.
    pub fn parse_line(&mut self, headers: &mut Headers, line: &[u8]) -> Result<bool, HttpError> {
        let is_continuation = matches!(line.first(), Some(b' ') | Some(b'\t'));
        if is_continuation {
            match &mut self.partial {
                Some(partial) => partial.extend_from_slice(line),
                None => return Err(HttpError::data("header continuation without a prior header")),
            }
            return Ok(true);
        }

        self.flush(headers)?;
        if line.is_empty() {
            return Ok(false);
        }
        self.partial = Some(line.to_vec());
        Ok(true)
    }

    fn flush(&mut self, headers: &mut Headers) -> Result<(), HttpError> {
        let Some(raw) = self.partial.take() else {
            return Ok(());
        };
        let text = String::from_utf8_lossy(&raw);
        let idx = text
            .find(':')
            .ok_or_else(|| HttpError::data("malformed header: missing ':'"))?;
        let name = text[..idx].trim_end();
        let value = text[idx + 1..].trim();
        if name.is_empty() {
            return Err(HttpError::data("malformed header: empty name"));
        }
        headers.add(name.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getlist_preserves_per_name_order() {
        let mut h = Headers::new();
        h.add("Set-Cookie", "a=1");
        h.add("Set-Cookie", "b=2");
        assert_eq!(h.getlist("set-cookie"), vec!["a=1", "b=2"]);
        assert_eq!(h.get("SET-COOKIE"), Some("a=1, b=2".to_string()));
    }

    #[test]
    fn set_replaces_all_prior_entries() {
        let mut h = Headers::new();
        h.add("X-Foo", "1");
        h.add("X-Foo", "2");
        h.set("x-foo", "3");
        assert_eq!(h.getlist("X-Foo"), vec!["3"]);
    }

    #[test]
    fn update_without_merge_replaces_then_appends() {
        let mut base = Headers::new();
        base.add("X-Foo", "old");

        let mut incoming = Headers::new();
        incoming.add("X-Foo", "new1");
        incoming.add("X-Foo", "new2");

        base.update(&incoming, false);
        assert_eq!(base.getlist("X-Foo"), vec!["new1", "new2"]);

        // idempotent: applying again yields the same result
        base.update(&incoming, false);
        assert_eq!(base.getlist("X-Foo"), vec!["new1", "new2"]);
    }

    #[test]
    fn update_with_merge_never_replaces() {
        let mut base = Headers::new();
        base.add("X-Foo", "old");
        let mut incoming = Headers::new();
        incoming.add("X-Foo", "new");
        base.update(&incoming, true);
        assert_eq!(base.getlist("X-Foo"), vec!["old", "new"]);
    }

    #[test]
    fn to_lines_canonicalizes_with_www_override() {
        let mut h = Headers::new();
        h.add("content-type", "text/plain");
        h.add("www-authenticate", "Basic");
        let lines = h.to_lines();
        assert!(lines.contains("Content-Type: text/plain\r\n"));
        assert!(lines.contains("WWW-Authenticate: Basic\r\n"));
    }

    #[test]
    fn header_parser_joins_continuation_lines() {
        let mut parser = HeaderParser::new();
        let mut headers = Headers::new();
        assert!(parser.parse_line(&mut headers, b"X-Long: first").unwrap());
        assert!(parser.parse_line(&mut headers, b" second").unwrap());
        assert!(!parser.parse_line(&mut headers, b"").unwrap());
        assert_eq!(headers.get("X-Long"), Some("first second".to_string()));
    }

    #[test]
    fn header_parser_rejects_malformed_line() {
        let mut parser = HeaderParser::new();
        let mut headers = Headers::new();
        assert!(parser.parse_line(&mut headers, b"no-colon-here").is_err());
    }
}
