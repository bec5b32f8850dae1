//! Transport header conventions and compressed body handling.

use std::io::{self, Read};

use bytes::Bytes;

use crate::bus::Headers;

pub const ACCEPT_ENCODING_HEADER: &str = "Accept-Encoding";
pub const CONTENT_ENCODING_HEADER: &str = "Content-Encoding";
pub const STATUS_HEADER: &str = "Status";
pub const SNAPPY_ENCODING: &str = "snappy";
pub const NO_RESPONDERS_STATUS: &str = "503";

const SERVER_PING_SUBJECT: &str = "$SYS.REQ.SERVER.PING";
const ACCOUNT_REQUEST_PREFIX: &str = "$SYS.REQ.ACCOUNT";

/// Whether a request to `subject` may advertise compressed replies. The
/// server ping and account requests are answered by the server itself, which
/// does not negotiate encodings.
pub fn negotiates_compression(subject: &str) -> bool {
    subject != SERVER_PING_SUBJECT && !subject.starts_with(ACCOUNT_REQUEST_PREFIX)
}

/// Headers for an outbound request to `subject`.
pub fn request_headers(subject: &str) -> Headers {
    let mut headers = Headers::new();
    if negotiates_compression(subject) {
        headers.insert(ACCEPT_ENCODING_HEADER, SNAPPY_ENCODING);
    }
    headers
}

/// Whether a reply signals that no service instance can answer.
pub fn is_unavailable(headers: &Headers) -> bool {
    headers.get(STATUS_HEADER).map(str::trim) == Some(NO_RESPONDERS_STATUS)
}

/// Return the plain body of a reply, decoding the snappy frame format when the
/// reply declares it.
pub fn decode_body(headers: &Headers, payload: Bytes) -> io::Result<Bytes> {
    match headers.get(CONTENT_ENCODING_HEADER) {
        Some(encoding) if encoding.eq_ignore_ascii_case(SNAPPY_ENCODING) => {
            let mut decoded = Vec::new();
            snap::read::FrameDecoder::new(payload.as_ref()).read_to_end(&mut decoded)?;
            Ok(Bytes::from(decoded))
        }
        _ => Ok(payload),
    }
}

/// Compress a body with the snappy frame format.
pub fn encode_snappy(body: &[u8]) -> io::Result<Bytes> {
    use std::io::Write;

    let mut encoder = snap::write::FrameEncoder::new(Vec::new());
    encoder.write_all(body)?;
    let encoded = encoder
        .into_inner()
        .map_err(|err| io::Error::new(err.error().kind(), err.error().to_string()))?;
    Ok(Bytes::from(encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_subjects_skip_compression() {
        assert!(request_headers("$SYS.REQ.SERVER.PING").get(ACCEPT_ENCODING_HEADER).is_none());
        assert!(request_headers("$SYS.REQ.ACCOUNT.PING.CONNZ").get(ACCEPT_ENCODING_HEADER).is_none());
        assert_eq!(request_headers("$SYS.REQ.SERVER.PING.VARZ").get(ACCEPT_ENCODING_HEADER), Some("snappy"));
        assert_eq!(request_headers("orders.get").get(ACCEPT_ENCODING_HEADER), Some("snappy"));
    }

    #[test]
    fn snappy_bodies_are_decoded() {
        let body = br#"{"id":7,"status":"shipped"}"#;
        let encoded = encode_snappy(body).unwrap();
        let headers: Headers = [(CONTENT_ENCODING_HEADER, SNAPPY_ENCODING)].into_iter().collect();
        assert_eq!(decode_body(&headers, encoded).unwrap().as_ref(), body);
    }

    #[test]
    fn plain_bodies_pass_through() {
        let payload = Bytes::from_static(b"plain");
        assert_eq!(decode_body(&Headers::new(), payload.clone()).unwrap(), payload);
    }

    #[test]
    fn corrupt_snappy_body_is_an_error() {
        let headers: Headers = [(CONTENT_ENCODING_HEADER, SNAPPY_ENCODING)].into_iter().collect();
        assert!(decode_body(&headers, Bytes::from_static(b"definitely not snappy")).is_err());
    }

    #[test]
    fn status_503_means_unavailable() {
        let headers: Headers = [(STATUS_HEADER, "503")].into_iter().collect();
        assert!(is_unavailable(&headers));
        assert!(!is_unavailable(&Headers::new()));
    }
}
