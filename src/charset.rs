//! Character set detection and decoding of fetched page bodies.
//!
//! Detection is a prioritized chain: byte-order mark, HTTP `Content-Type`
//! charset, in-document `<meta>` declaration, then a statistical guess. The
//! first candidate that decodes the body without malformed sequences wins.
//! Single-byte candidates are skipped for non-ASCII bodies that are valid
//! UTF-8, and UTF-16 labels without a byte-order mark are read as UTF-8.
//! When none decodes cleanly, the candidate producing the fewest replacement
//! characters is used, with UTF-8 as the last resort.

use chardetng::EncodingDetector;
use encoding_rs::{DecoderResult, Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// How far into the document an in-document declaration is searched for.
const META_SCAN_LIMIT: usize = 4096;

static META_CHARSET_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*?charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#)
        .expect("Failed to compile meta charset regex")
});

/// Everything a detector may look at.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CharsetInput<'a> {
    pub bytes: &'a [u8],
    /// Raw `Content-Type` header value.
    pub content_type: Option<&'a str>,
    /// Top-level domain of the page's host, used as a hint by the statistical detector.
    pub tld: Option<&'a str>,
    /// The body was cut at the size cap, so a trailing partial character is expected.
    pub truncated: bool,
}

/// One link of the detection chain.
pub(crate) trait CharsetDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&self, input: &CharsetInput<'_>) -> Option<&'static Encoding>;
}

/// Byte-order mark at the start of the body.
struct ByteOrderMark;

impl CharsetDetector for ByteOrderMark {
    fn name(&self) -> &'static str {
        "bom"
    }

    fn detect(&self, input: &CharsetInput<'_>) -> Option<&'static Encoding> {
        Encoding::for_bom(input.bytes).map(|(encoding, _)| encoding)
    }
}

/// `charset` parameter of the HTTP `Content-Type` header.
struct HeaderCharset;

impl CharsetDetector for HeaderCharset {
    fn name(&self) -> &'static str {
        "http-header"
    }

    fn detect(&self, input: &CharsetInput<'_>) -> Option<&'static Encoding> {
        let label = charset_from_content_type(input.content_type?)?;
        // UTF-16 without a BOM is not trusted from a header either.
        Encoding::for_label(label.as_bytes()).map(|e| e.output_encoding())
    }
}

/// `<meta charset>` or `<meta http-equiv="Content-Type" content="...; charset=...">`.
struct MetaCharset;

impl CharsetDetector for MetaCharset {
    fn name(&self) -> &'static str {
        "meta-tag"
    }

    fn detect(&self, input: &CharsetInput<'_>) -> Option<&'static Encoding> {
        let head = &input.bytes[..input.bytes.len().min(META_SCAN_LIMIT)];
        let captures = META_CHARSET_REGEX.captures(head)?;
        let label = captures.get(1)?.as_bytes();
        // A UTF-16 declaration inside an ASCII-compatible document means UTF-8.
        Encoding::for_label(label).map(|e| e.output_encoding())
    }
}

/// Statistical guess over the byte distribution.
struct ByteStatistics;

impl CharsetDetector for ByteStatistics {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn detect(&self, input: &CharsetInput<'_>) -> Option<&'static Encoding> {
        let mut detector = EncodingDetector::new();
        detector.feed(input.bytes, !input.truncated);
        let tld = input
            .tld
            .filter(|t| !t.is_empty() && t.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()))
            .map(str::as_bytes);
        Some(detector.guess(tld, true))
    }
}

/// The detectors in priority order.
pub(crate) fn default_chain() -> Vec<Box<dyn CharsetDetector>> {
    vec![
        Box::new(ByteOrderMark),
        Box::new(HeaderCharset),
        Box::new(MetaCharset),
        Box::new(ByteStatistics),
    ]
}

/// Result of decoding a body.
#[derive(Debug, Clone)]
pub(crate) struct Decoded {
    pub text: String,
    pub encoding: &'static Encoding,
    /// Name of the detector that chose the encoding, or "fallback".
    pub source: &'static str,
    /// True when replacement characters had to be inserted.
    pub lossy: bool,
}

/// Extracts the `charset` parameter from a `Content-Type` header value.
pub(crate) fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|value| !value.is_empty())
}

/// Strips a byte-order mark matching `encoding`, if present.
fn without_bom<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> &'a [u8] {
    match Encoding::for_bom(bytes) {
        Some((bom_encoding, len)) if bom_encoding == encoding => &bytes[len..],
        _ => bytes,
    }
}

/// A single-byte label over non-ASCII bytes that are valid UTF-8 is a mislabel:
/// every byte sequence decodes under a single-byte encoding, so it proves nothing.
fn is_mislabeled_utf8(encoding: &'static Encoding, input: &CharsetInput<'_>) -> bool {
    encoding.is_single_byte()
        && !input.bytes.is_ascii()
        && decode_strict(UTF_8, input.bytes, input.truncated).is_some()
}

/// Decodes `bytes` as `encoding`, failing on the first malformed sequence.
/// A partial character at the end is tolerated when `truncated` is set.
fn decode_strict(encoding: &'static Encoding, bytes: &[u8], truncated: bool) -> Option<String> {
    let bytes = without_bom(encoding, bytes);
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder.max_utf8_buffer_length_without_replacement(bytes.len())?;
    let mut out = String::with_capacity(capacity);
    let (result, _read) = decoder.decode_to_string_without_replacement(bytes, &mut out, !truncated);
    match result {
        DecoderResult::InputEmpty => Some(out),
        DecoderResult::Malformed(_, _) | DecoderResult::OutputFull => None,
    }
}

fn decode_lossy(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _had_errors) = encoding.decode_without_bom_handling(without_bom(encoding, bytes));
    text.into_owned()
}

/// Decodes `input.bytes` with the first detector whose encoding fits the bytes.
pub(crate) fn decode_with_chain(
    chain: &[Box<dyn CharsetDetector>],
    input: &CharsetInput<'_>,
) -> Decoded {
    let mut tried: Vec<(&'static Encoding, &'static str)> = Vec::new();

    for detector in chain {
        let Some(encoding) = detector.detect(input) else {
            continue;
        };
        if tried.iter().any(|(e, _)| *e == encoding) {
            continue;
        }
        if is_mislabeled_utf8(encoding, input) {
            tracing::debug!(target: "fetch_task",
                "Ignoring {} from {}: body is valid UTF-8", encoding.name(), detector.name()
            );
            continue;
        }
        tried.push((encoding, detector.name()));

        if let Some(text) = decode_strict(encoding, input.bytes, input.truncated) {
            tracing::debug!(target: "fetch_task",
                "Decoded body as {} (chosen by {})", encoding.name(), detector.name()
            );
            return Decoded {
                text,
                encoding,
                source: detector.name(),
                lossy: false,
            };
        }
        tracing::debug!(target: "fetch_task",
            "Body is not valid {} (suggested by {}), trying next detector",
            encoding.name(), detector.name()
        );
    }

    if !tried.iter().any(|(e, _)| *e == UTF_8) {
        tried.push((UTF_8, "fallback"));
    }

    // Nothing decoded cleanly: keep the candidate with the fewest replacements,
    // earlier (higher priority) candidates winning ties.
    let mut best: Option<(usize, Decoded)> = None;
    for (encoding, source) in tried {
        let text = decode_lossy(encoding, input.bytes);
        let replacements = text.matches('\u{FFFD}').count();
        if best.as_ref().is_none_or(|(count, _)| replacements < *count) {
            best = Some((
                replacements,
                Decoded {
                    text,
                    encoding,
                    source,
                    lossy: replacements > 0,
                },
            ));
        }
    }

    let (replacements, decoded) = best.unwrap_or_else(|| {
        (
            0,
            Decoded {
                text: String::new(),
                encoding: UTF_8,
                source: "fallback",
                lossy: false,
            },
        )
    });
    tracing::debug!(target: "fetch_task",
        "No clean decoding found; using {} with {} replacement characters",
        decoded.encoding.name(), replacements
    );
    decoded
}
