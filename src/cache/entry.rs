//! On-disk entry layout: `[preamble][3-byte tag][delimiter][image bytes]`.
//!
//! The preamble makes a cache file inert if a misconfigured web server ever
//! hands it to a script interpreter. A zero-length file is a failure sentinel.

use crate::domain::ImageKind;

pub const PREAMBLE: &[u8] = b"<?php die('Execution denied!'); //";
pub const DELIMITER: &[u8] = b"?>";
pub const TAG_LEN: usize = 3;
pub const HEADER_LEN: usize = PREAMBLE.len() + TAG_LEN + DELIMITER.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub kind: ImageKind,
    pub payload_offset: u64,
    pub payload_len: u64,
}

pub fn encode_entry(kind: ImageKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(PREAMBLE);
    out.extend_from_slice(kind.tag().as_bytes());
    out.extend_from_slice(DELIMITER);
    out.extend_from_slice(payload);
    out
}

/// Validate the leading bytes of an entry whose total size is `file_len`.
pub fn parse_header(head: &[u8], file_len: u64) -> Result<EntryHeader, &'static str> {
    if head.len() < HEADER_LEN {
        return Err("shorter than entry header");
    }
    if &head[..PREAMBLE.len()] != PREAMBLE {
        return Err("guard preamble mismatch");
    }
    let tag = &head[PREAMBLE.len()..PREAMBLE.len() + TAG_LEN];
    let kind = ImageKind::from_tag(tag).ok_or("unknown format tag")?;
    if &head[PREAMBLE.len() + TAG_LEN..HEADER_LEN] != DELIMITER {
        return Err("delimiter mismatch");
    }
    let payload_len = file_len
        .checked_sub(HEADER_LEN as u64)
        .ok_or("file shorter than header")?;
    Ok(EntryHeader {
        kind,
        payload_offset: HEADER_LEN as u64,
        payload_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_entry_parses_back() {
        let bytes = encode_entry(ImageKind::Png, b"\x89PNG-body");
        let header = parse_header(&bytes, bytes.len() as u64).expect("valid header");
        assert_eq!(header.kind, ImageKind::Png);
        assert_eq!(header.payload_offset as usize, HEADER_LEN);
        assert_eq!(&bytes[HEADER_LEN..], b"\x89PNG-body");
        assert_eq!(header.payload_len, 9);
    }

    #[test]
    fn rejects_tampered_headers() {
        let mut bytes = encode_entry(ImageKind::Jpeg, b"data");
        bytes[0] = b'X';
        assert_eq!(
            parse_header(&bytes, bytes.len() as u64),
            Err("guard preamble mismatch")
        );

        let mut bytes = encode_entry(ImageKind::Jpeg, b"data");
        bytes[PREAMBLE.len()] = b'z';
        assert_eq!(
            parse_header(&bytes, bytes.len() as u64),
            Err("unknown format tag")
        );

        let bytes = encode_entry(ImageKind::Gif, b"");
        assert!(parse_header(&bytes[..HEADER_LEN - 1], HEADER_LEN as u64 - 1).is_err());
    }

    #[test]
    fn header_only_entry_has_empty_payload() {
        let bytes = encode_entry(ImageKind::Gif, b"");
        let header = parse_header(&bytes, bytes.len() as u64).expect("valid header");
        assert_eq!(header.payload_len, 0);
    }
}
