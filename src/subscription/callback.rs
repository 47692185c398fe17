//! URL normalization for callbacks and topics.
//!
//! The normalized string is the storage key for a callback, so two spellings
//! of the same endpoint must collapse to one form:
//! - scheme and host lowercased, IDNA hosts converted to punycode
//! - default ports removed, empty http(s) path becomes `/`
//! - dot segments resolved
//! - percent-encoding canonicalized: unreserved characters decoded,
//!   remaining escapes use uppercase hex
//!
//! Normalizing an already normalized URL returns it unchanged.

use percent_encoding::percent_decode_str;
use url::Url;

/// Parse and normalize a URL. `None` when the input is not an absolute URL.
pub fn normalize_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut url = Url::parse(raw).ok()?;

    let path = canonical_percent_encoding(url.path());
    url.set_path(&path);

    if let Some(query) = url.query().map(canonical_percent_encoding) {
        url.set_query(Some(&query));
    }
    if let Some(fragment) = url.fragment().map(canonical_percent_encoding) {
        url.set_fragment(Some(&fragment));
    }

    Some(url)
}

/// True for absolute `http`/`https` URLs with a host.
pub fn is_http_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
}

fn canonical_percent_encoding(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        match rest.get(..3).filter(|escape| is_escape(escape)) {
            Some(escape) => {
                match percent_decode_str(escape).next() {
                    Some(byte) if is_unreserved(byte) => out.push(char::from(byte)),
                    _ => out.push_str(&escape.to_ascii_uppercase()),
                }
                rest = &rest[3..];
            }
            // A lone '%' is data, not an escape
            None => {
                out.push_str("%25");
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);

    out
}

fn is_escape(candidate: &str) -> bool {
    candidate.len() == 3 && candidate.as_bytes()[1..].iter().all(u8::is_ascii_hexdigit)
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}
