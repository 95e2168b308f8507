//! Backend URI construction.

use std::fmt::Write;

/// Characters kept literal when re-encoding a proxied path.
const PATH_SAFE: &[u8] = b":/?#[]@!$&'()*+,;=-._~";

/// Join URL path segments with exactly one `/` between them.
///
/// Leading slash of the first piece and trailing slash of the last one are
/// preserved; empty pieces are skipped.
pub fn url_path_join(pieces: &[&str]) -> String {
    let pieces: Vec<&str> = pieces.iter().copied().filter(|p| !p.is_empty()).collect();
    let (first, last) = match (pieces.first(), pieces.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return String::new(),
    };

    let initial = first.starts_with('/');
    let fin = last.ends_with('/');
    let joined = pieces
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    let mut result = String::with_capacity(joined.len() + 2);
    if initial {
        result.push('/');
    }
    result.push_str(&joined);
    if fin && !result.ends_with('/') {
        result.push('/');
    }
    result
}

/// Mount path of a non-named route.
///
/// `localhost` targets are addressed by port alone.
pub fn context_path(base_url: &str, host: &str, port: u16, absolute: bool) -> String {
    let kind = if absolute { "proxy/absolute" } else { "proxy" };
    let target = if host == "localhost" {
        port.to_string()
    } else {
        format!("{}:{}", host, port)
    };
    url_path_join(&[base_url, kind, &target])
}

fn hex(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Decode `%XX` escapes. Malformed escapes are kept as-is.
pub fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Percent-encode a path, keeping RFC 3986 reserved and unreserved
/// characters literal.
pub fn quote_path(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    for &b in raw {
        if b.is_ascii_alphanumeric() || PATH_SAFE.contains(&b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
    out
}

/// Normalize a proxied path: decode, then re-encode.
pub fn normalize_path(path: &str) -> String {
    quote_path(&percent_decode(path))
}

/// `{scheme}://{host}:{port}{path}[?query]`.
pub fn backend_uri(scheme: &str, host: &str, port: u16, path: &str, query: Option<&str>) -> String {
    let mut uri = format!("{}://{}:{}{}", scheme, host, port, normalize_path(path));
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        uri.push('?');
        uri.push_str(query);
    }
    uri
}
