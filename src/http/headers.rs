//! Header filtering across the proxy boundary.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Keep every `set-cookie` occurrence distinct
//! - Collapse any other repeated header to its last occurrence
//!
//! # Design Decisions
//! - `HeaderCollection` only exposes explicit `set` and `append`, so callers
//!   cannot merge cookies by accident
//! - Non-cookie duplicates are resolved as "last write wins". The rule is
//!   arbitrary but deterministic and matches what callers historically saw

use axum::http::header::{self, AsHeaderName, HeaderMap, HeaderName, HeaderValue};

/// Headers scoped to a single transport hop. Never relayed.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Case-insensitive membership test against [`HOP_BY_HOP_HEADERS`].
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}

/// Ordered, case-insensitive header multimap with explicit write semantics.
#[derive(Debug, Clone, Default)]
pub struct HeaderCollection {
    inner: HeaderMap,
}

impl HeaderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every existing value for `name` with `value`.
    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.insert(name, value);
    }

    /// Add `value` after any existing values for `name`.
    pub fn append(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.append(name, value);
    }

    /// Remove all values for `name`, returning the first one.
    pub fn remove<K: AsHeaderName>(&mut self, name: K) -> Option<HeaderValue> {
        self.inner.remove(name)
    }

    pub fn get<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.inner.get(name)
    }

    pub fn get_all<K: AsHeaderName>(&self, name: K) -> impl Iterator<Item = &HeaderValue> {
        self.inner.get_all(name).into_iter()
    }

    pub fn contains<K: AsHeaderName>(&self, name: K) -> bool {
        self.inner.contains_key(name)
    }

    /// Number of values, counting each repeated occurrence.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.inner.iter()
    }

    pub fn as_map(&self) -> &HeaderMap {
        &self.inner
    }

    pub fn into_inner(self) -> HeaderMap {
        self.inner
    }
}

impl From<HeaderMap> for HeaderCollection {
    fn from(inner: HeaderMap) -> Self {
        Self { inner }
    }
}

/// Copy `input` minus hop-by-hop headers.
///
/// `set-cookie` values are appended one by one in their original order; every
/// other name is written with `set`, so only its final occurrence survives.
pub fn filter_headers(input: &HeaderMap) -> HeaderCollection {
    let mut output = HeaderCollection::new();

    for (name, value) in input.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if name == header::SET_COOKIE {
            output.append(name.clone(), value.clone());
        } else {
            output.set(name.clone(), value.clone());
        }
    }

    output
}
