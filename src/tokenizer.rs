//! Byte-Level Tokenizer
//!
//! Every byte of the UTF-8 input is one token, so the vocabulary is exactly
//! 256 ids and any string round-trips. A model with a larger vocabulary
//! (the GPT-2 preset has 50257) simply never sees the ids above 255.
//!
//! ```text
//! "Hi!" → [72, 105, 33]
//! ```
//!
//! Decoding is lossy only for id sequences that are not valid UTF-8 (for
//! example a multi-byte character cut off by generation); those bytes
//! become U+FFFD.

/// Converts text to token ids and back
pub trait Tokenizer {
    fn encode(&self, text: &str) -> Vec<usize>;
    fn decode(&self, ids: &[usize]) -> String;
    /// Number of distinct ids `encode` can produce
    fn vocab_size(&self) -> usize;
}

/// One token per byte
#[derive(Clone, Copy, Debug, Default)]
pub struct ByteTokenizer;

impl ByteTokenizer {
    pub const VOCAB_SIZE: usize = 256;
}

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> Vec<usize> {
        text.bytes().map(usize::from).collect()
    }

    fn decode(&self, ids: &[usize]) -> String {
        // Ids outside the byte range cannot come from encode; skip them
        let bytes: Vec<u8> = ids.iter().filter_map(|&id| u8::try_from(id).ok()).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn vocab_size(&self) -> usize {
        Self::VOCAB_SIZE
    }
}

pub fn text_to_token_ids<T: Tokenizer + ?Sized>(text: &str, tokenizer: &T) -> Vec<usize> {
    tokenizer.encode(text)
}

pub fn token_ids_to_text<T: Tokenizer + ?Sized>(ids: &[usize], tokenizer: &T) -> String {
    tokenizer.decode(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_and_unicode_round_trip() {
        let tok = ByteTokenizer;
        assert_eq!(tok.encode("Hi!"), vec![72, 105, 33]);

        let text = "Every effort moves you, naïve café";
        let ids = text_to_token_ids(text, &tok);
        assert!(ids.iter().all(|&id| id < ByteTokenizer::VOCAB_SIZE));
        assert_eq!(token_ids_to_text(&ids, &tok), text);
    }

    #[test]
    fn test_decode_tolerates_bad_ids() {
        let tok = ByteTokenizer;
        // 0xC3 starts a two-byte sequence that never finishes
        assert_eq!(tok.decode(&[104, 105, 0xC3]), "hi\u{FFFD}");
        assert_eq!(tok.decode(&[104, 300, 105]), "hi");
    }
}
