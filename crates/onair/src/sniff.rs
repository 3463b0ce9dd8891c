use crate::load_error::LoadError;

/// What the first bytes of a stream look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedFormat {
    Id3,
    Mpeg,
    Adts,
    Ogg,
    Flac,
    Wav,
    Mp4,
    MpegTs,
    /// HTML, XML, JSON or a playlist: a server page, not audio.
    Markup,
    Unknown,
}

impl SniffedFormat {
    pub fn is_audio(&self) -> bool {
        !matches!(self, SniffedFormat::Markup | SniffedFormat::Unknown)
    }
}

const TS_PACKET: usize = 188;

const MARKUP_PREFIXES: [&[u8]; 10] = [
    b"<!doctype",
    b"<html",
    b"<head",
    b"<body",
    b"<?xml",
    b"{\"",
    b"#EXTM3U",
    b"[playlist]",
    b"HTTP/",
    b"ICY 4",
];

/// Bytes that must be plain text before a payload counts as markup.
const TEXT_WINDOW: usize = 64;

pub fn sniff(bytes: &[u8]) -> SniffedFormat {
    if bytes.starts_with(b"ID3") {
        return SniffedFormat::Id3;
    }
    if bytes.starts_with(b"OggS") {
        return SniffedFormat::Ogg;
    }
    if bytes.starts_with(b"fLaC") {
        return SniffedFormat::Flac;
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return SniffedFormat::Wav;
    }
    if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
        return SniffedFormat::Mp4;
    }
    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0 {
        // layer bits 00 mark ADTS
        return if bytes[1] & 0x06 == 0 {
            SniffedFormat::Adts
        } else {
            SniffedFormat::Mpeg
        };
    }
    if bytes.len() > TS_PACKET && bytes[0] == 0x47 && bytes[TS_PACKET] == 0x47 {
        return SniffedFormat::MpegTs;
    }

    let text = trim_text_start(bytes);
    if MARKUP_PREFIXES
        .iter()
        .any(|prefix| starts_with_ignore_case(text, prefix))
        && is_text(&text[..text.len().min(TEXT_WINDOW)])
    {
        return SniffedFormat::Markup;
    }
    SniffedFormat::Unknown
}

/// Rejects payloads that are clearly not audio.
///
/// Only markup is rejected: unknown binary data is passed on and left to the
/// decoder.
pub fn check_audio(bytes: &[u8]) -> Result<SniffedFormat, LoadError> {
    match sniff(bytes) {
        SniffedFormat::Markup => {
            let preview: String = String::from_utf8_lossy(trim_text_start(bytes))
                .chars()
                .take(32)
                .collect();
            Err(LoadError::unrecognized_format(format!(
                "Expected audio, got text: {:?}",
                preview
            )))
        }
        format => Ok(format),
    }
}

fn trim_text_start(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Valid UTF-8 without control characters other than whitespace. A multibyte
/// character cut off at the end of the window is allowed.
fn is_text(window: &[u8]) -> bool {
    let text = match std::str::from_utf8(window) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => {
            // valid up to the cut
            std::str::from_utf8(&window[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return false,
    };
    text.chars().all(|c| !c.is_control() || c.is_whitespace())
}

fn starts_with_ignore_case(bytes: &[u8], prefix: &[u8]) -> bool {
    bytes.len() >= prefix.len() && bytes[..prefix.len()].eq_ignore_ascii_case(prefix)
}
