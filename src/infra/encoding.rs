use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

/// Decodes a page whose charset has to be guessed from the bytes alone.
///
/// A byte-order mark takes precedence over the detector's guess. Returns the
/// decoded text and the encoding actually used.
pub fn decode_sniffed(bytes: &[u8]) -> (String, &'static Encoding) {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, true);
    let (text, used, _had_errors) = guess.decode(bytes);
    (text.into_owned(), used)
}

/// Decodes a page as UTF-8 regardless of what it declares. Bad sequences become U+FFFD.
pub fn decode_utf8(bytes: &[u8]) -> String {
    let (text, _had_errors) = UTF_8.decode_with_bom_removal(bytes);
    text.into_owned()
}
