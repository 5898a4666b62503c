//! Byte-range header handling for the content read path.

use std::ops::Range;

use axum::http::header::{HeaderMap, HeaderValue, CONTENT_RANGE, CONTENT_TYPE};

use crate::response::insert_header;

/// Parse a `Range` header into a half-open byte range.
///
/// Only single ranges of the form `bytes=start-end` are supported; the
/// end is inclusive on the wire and exclusive here.
pub fn parse_range_header(range: &HeaderValue) -> Option<Range<u64>> {
    let range = range.to_str().ok()?;
    let mut parts = range.splitn(2, '=');
    if parts.next() != Some("bytes") {
        return None;
    }
    let mut range = parts.next()?.splitn(2, '-');
    let start: u64 = range.next()?.parse().ok()?;
    let end: u64 = range.next()?.parse::<u64>().ok()?.checked_add(1)?;
    if start >= end {
        return None;
    }
    Some(Range { start, end })
}

pub fn add_content_range_headers(headers: &mut HeaderMap, range: Range<u64>, size: u64) {
    if range.end == 0 {
        return;
    }
    let content_range = format!("bytes {}-{}/{}", range.start, range.end - 1, size);
    insert_header(headers, CONTENT_RANGE, &content_range);
}

pub fn add_content_type_headers(headers: &mut HeaderMap, name: &str) {
    let guess = mime_guess::from_path(name);
    let content_type = guess.first_or_octet_stream().to_string();
    insert_header(headers, CONTENT_TYPE, &content_type);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_range_header_test() {
        let range = HeaderValue::from_static("bytes=0-10");
        assert_eq!(parse_range_header(&range), Some(Range { start: 0, end: 11 }));

        let range = HeaderValue::from_static("bytes=5-5");
        assert_eq!(parse_range_header(&range), Some(Range { start: 5, end: 6 }));

        // wrong unit
        let range = HeaderValue::from_static("byts=0-10");
        assert_eq!(parse_range_header(&range), None);

        // suffix and open-ended forms are not supported
        let range = HeaderValue::from_static("bytes=-10");
        assert_eq!(parse_range_header(&range), None);
        let range = HeaderValue::from_static("bytes=10-");
        assert_eq!(parse_range_header(&range), None);

        // inverted
        let range = HeaderValue::from_static("bytes=10-2");
        assert_eq!(parse_range_header(&range), None);
    }

    #[test]
    fn add_content_range_headers_test() {
        let mut headers = HeaderMap::new();
        add_content_range_headers(&mut headers, 0..11, 100);
        assert_eq!(headers.get(CONTENT_RANGE).unwrap(), "bytes 0-10/100");
    }

    #[test]
    fn add_content_type_headers_test() {
        let mut headers = HeaderMap::new();
        add_content_type_headers(&mut headers, "cover.jpeg");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "image/jpeg");

        let mut headers = HeaderMap::new();
        add_content_type_headers(&mut headers, "bafyblob");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/octet-stream");
    }
}
