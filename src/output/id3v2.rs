//! Minimal ID3v2.3 tag writer

use crate::domain::model::Metadata;

/// UTF-16 with BOM
const ENCODING_UTF16: u8 = 1;

fn utf16_with_bom(text: &str) -> Vec<u8> {
    let mut out = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

fn frame(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + body.len());
    out.extend_from_slice(id);
    // v2.3 frame sizes are plain big endian
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(body);
    out
}

fn text_frame(id: &[u8; 4], text: &str) -> Vec<u8> {
    let mut body = vec![ENCODING_UTF16];
    body.extend(utf16_with_bom(text));
    frame(id, &body)
}

fn comment_frame(text: &str) -> Vec<u8> {
    let mut body = vec![ENCODING_UTF16];
    body.extend_from_slice(b"eng");
    // Empty description, then the terminator
    body.extend(utf16_with_bom(""));
    body.extend_from_slice(&[0, 0]);
    body.extend(utf16_with_bom(text));
    frame(b"COMM", &body)
}

/// 28-bit size spread over four 7-bit bytes
pub fn syncsafe(size: u32) -> [u8; 4] {
    [
        ((size >> 21) & 0x7F) as u8,
        ((size >> 14) & 0x7F) as u8,
        ((size >> 7) & 0x7F) as u8,
        (size & 0x7F) as u8,
    ]
}

/// Complete tag for `metadata`. Fields that are not set are left out.
pub fn header(metadata: &Metadata) -> Vec<u8> {
    let text_frames: [(&[u8; 4], Option<&str>); 4] = [
        (b"TIT2", metadata.title.as_deref()),
        (b"TPE1", metadata.artist.as_deref()),
        (b"TALB", metadata.album.as_deref()),
        (b"TYER", metadata.date.as_deref()),
    ];

    let mut frames = Vec::new();
    for (id, text) in text_frames {
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            frames.extend(text_frame(id, text));
        }
    }
    if let Some(comment) = metadata.comment.as_deref().filter(|c| !c.is_empty()) {
        frames.extend(comment_frame(comment));
    }

    let mut tag = Vec::with_capacity(10 + frames.len());
    tag.extend_from_slice(b"ID3");
    tag.extend_from_slice(&[3, 0, 0]);
    tag.extend_from_slice(&syncsafe(frames.len() as u32));
    tag.extend(frames);
    tag
}
