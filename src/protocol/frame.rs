//! Frame encoding: one text frame per WebSocket message.
//!
//! ```text
//! frame   = flag payload
//! flag    = 'f' (flat) | 'z' (lz-string UTF-16 compressed)
//! payload = message *( 0x02 message )
//! message = type-tag body
//! ```
//!
//! Batches whose joined length (in UTF-16 units, as the server counts)
//! exceeds the threshold are compressed; everything else is sent flat.

use crate::error::ProtocolError;

/// Encoding flag for an uncompressed payload.
pub const FLAG_FLAT: char = 'f';

/// Encoding flag for an lz-string `compressToUTF16` payload.
pub const FLAG_COMPRESSED: char = 'z';

/// Separates the fields of a single message body.
pub const FIELD_SEPARATOR: char = '\u{1}';

/// Separates messages within one frame.
pub const MESSAGE_SEPARATOR: char = '\u{2}';

/// Prefixes a single message with the flat flag, bypassing batching.
#[must_use]
pub fn flat(message: &str) -> String {
    let mut frame = String::with_capacity(message.len() + 1);
    frame.push(FLAG_FLAT);
    frame.push_str(message);
    frame
}

/// Joins `messages` into one frame, compressing when the joined batch is
/// longer than `threshold` UTF-16 units.
#[must_use]
pub fn encode_batch<S: AsRef<str>>(messages: &[S], threshold: usize) -> String {
    let mut joined = String::new();
    for (i, msg) in messages.iter().enumerate() {
        if i > 0 {
            joined.push(MESSAGE_SEPARATOR);
        }
        joined.push_str(msg.as_ref());
    }

    if utf16_len(&joined) > threshold {
        let compressed = lz_str::compress_to_utf16(joined.as_str());
        tracing::debug!(
            raw = utf16_len(&joined),
            compressed = utf16_len(&compressed),
            "compressed outbound batch"
        );
        let mut frame = String::with_capacity(compressed.len() + 1);
        frame.push(FLAG_COMPRESSED);
        frame.push_str(&compressed);
        frame
    } else {
        flat(&joined)
    }
}

/// Strips the encoding flag and decompresses if needed, returning the
/// joined message payload.
///
/// # Errors
///
/// Returns [`ProtocolError::EmptyFrame`] for an empty frame,
/// [`ProtocolError::UnknownEncoding`] for an unrecognised flag and
/// [`ProtocolError::Decompression`] if a compressed payload is corrupt.
pub fn decode_frame(frame: &str) -> Result<String, ProtocolError> {
    let mut chars = frame.chars();
    let flag = chars.next().ok_or(ProtocolError::EmptyFrame)?;
    let data = chars.as_str();
    match flag {
        FLAG_FLAT => Ok(data.to_string()),
        FLAG_COMPRESSED => {
            let units =
                lz_str::decompress_from_utf16(data).ok_or(ProtocolError::Decompression)?;
            let payload = String::from_utf16(&units).map_err(|_| ProtocolError::Decompression)?;
            tracing::debug!(
                compressed = utf16_len(data),
                raw = units.len(),
                "compressed inbound frame"
            );
            Ok(payload)
        }
        other => Err(ProtocolError::UnknownEncoding(other)),
    }
}

/// Splits a decoded payload into its messages, in wire order.
pub fn split_messages(payload: &str) -> impl Iterator<Item = &str> {
    payload.split(MESSAGE_SEPARATOR)
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn short_batch_is_flat() {
        let frame = encode_batch(&["S2\u{1}", "C3\u{1}{}"], 100);
        assert_eq!(frame, "fS2\u{1}\u{2}C3\u{1}{}");
    }

    #[test]
    fn batch_at_threshold_stays_flat() {
        let msg = "x".repeat(100);
        let frame = encode_batch(&[msg.as_str()], 100);
        assert!(frame.starts_with(FLAG_FLAT));
    }

    #[test]
    fn long_batch_is_compressed_and_round_trips() {
        let messages: Vec<String> = (0..20)
            .map(|i| format!("C{i}\u{1}{{\"gate\":\"g{i}\",\"action\":\"start\"}}"))
            .collect();
        let joined = messages.join("\u{2}");
        assert!(joined.len() > 100);

        let frame = encode_batch(&messages, 100);
        assert!(frame.starts_with(FLAG_COMPRESSED));

        let Ok(decoded) = decode_frame(&frame) else {
            panic!("compressed frame must decode");
        };
        assert_eq!(decoded, joined);
    }

    #[test]
    fn flat_frame_decodes() {
        let Ok(decoded) = decode_frame("fLnode-1") else {
            panic!("flat frame must decode");
        };
        assert_eq!(decoded, "Lnode-1");
    }

    #[test]
    fn bad_frames_are_errors() {
        assert_eq!(decode_frame(""), Err(ProtocolError::EmptyFrame));
        assert_eq!(decode_frame("qabc"), Err(ProtocolError::UnknownEncoding('q')));
    }

    #[test]
    fn split_preserves_order() {
        let parts: Vec<&str> = split_messages("La\u{2}Ab\u{2}Uc").collect();
        assert_eq!(parts, vec!["La", "Ab", "Uc"]);
    }
}
