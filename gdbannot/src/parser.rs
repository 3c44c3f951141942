//! Annotation stream parser
//!
//! gdb started with `--annotate=3` interleaves its normal output with records
//! of the form `\n\x1a\x1aTAG[ ARGUMENT]\n`. The scanner splits an arbitrarily
//! chunked stream into plain text and annotations, holding back anything that
//! might still turn into a record once more input arrives.

use crate::types::*;
use once_cell::sync::Lazy;
use regex::Regex;

/// Lead-in of every annotation record
pub const LEAD_IN: &str = "\n\x1a\x1a";

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\x1a\x1a([A-Za-z0-9-]+)(?: ([^\n]*))?\n").expect("valid regex"));

static SOURCE_ARGUMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*):(\d+):\d*:[A-Za-z]*:(0x[0-9a-fA-F]+)$").expect("valid regex")
});

/// Incremental splitter for gdb's annotated output
#[derive(Debug, Default)]
pub struct AnnotationScanner {
    /// Text not yet resolved into segments
    pending: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    undecoded: Vec<u8>,
}

impl AnnotationScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text currently held back waiting for more input
    pub fn held_back(&self) -> &str {
        &self.pending
    }

    /// Drop everything accumulated so far
    pub fn reset(&mut self) {
        self.pending.clear();
        self.undecoded.clear();
    }

    /// Scan a raw chunk of process output
    pub fn scan_bytes(&mut self, bytes: &[u8]) -> Vec<Segment> {
        self.undecoded.extend_from_slice(bytes);

        // One U+FFFD per invalid sequence; an incomplete tail waits for the next chunk.
        let mut text = String::new();
        let mut decoded = 0;
        loop {
            match std::str::from_utf8(&self.undecoded[decoded..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    decoded = self.undecoded.len();
                    break;
                }
                Err(e) => {
                    let valid_end = decoded + e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.undecoded[decoded..valid_end]));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            decoded = valid_end + len;
                        }
                        None => {
                            decoded = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.undecoded.drain(..decoded);

        self.scan(&text)
    }

    /// Scan a chunk of already decoded output
    pub fn scan(&mut self, chunk: &str) -> Vec<Segment> {
        self.pending.push_str(chunk);

        let mut segments = Vec::new();
        let mut text_start = 0;

        for caps in MARKER.captures_iter(&self.pending) {
            let Some(whole) = caps.get(0) else { continue };

            push_text(&mut segments, &self.pending[text_start..whole.start()]);

            let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let argument = caps
                .get(2)
                .map(|m| m.as_str().to_string())
                .filter(|arg| !arg.is_empty());
            segments.push(Segment::Annotation(Annotation::new(AnnotationTag::from_name(tag), argument)));

            text_start = whole.end();
        }

        let rest = &self.pending[text_start..];
        let keep = rest.len() - held_back_len(rest);
        push_text(&mut segments, &rest[..keep]);

        self.pending.drain(..text_start + keep);
        segments
    }
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
}

/// Length of the suffix of `rest` that may still become an annotation
fn held_back_len(rest: &str) -> usize {
    // A lead-in with no line break after it is an unterminated record.
    let mut search_from = 0;
    while let Some(offset) = rest[search_from..].find(LEAD_IN) {
        let start = search_from + offset;
        if !rest[start + LEAD_IN.len()..].contains('\n') {
            return rest.len() - start;
        }
        search_from = start + 1;
    }

    // Otherwise hold back a partial lead-in at the very end.
    (1..LEAD_IN.len())
        .rev()
        .find(|&n| rest.ends_with(&LEAD_IN[..n]))
        .unwrap_or(0)
}

/// Parse the argument of a `source` annotation
///
/// The argument reads `FILE:LINE:COLUMN:MIDDLE:0xADDRESS`; the file name may
/// itself contain colons.
pub fn parse_source_argument(argument: &str) -> Option<ExecutionPosition> {
    let caps = SOURCE_ARGUMENT.captures(argument.trim_end())?;
    let line = caps.get(2)?.as_str().parse().ok()?;

    Some(ExecutionPosition {
        file: caps.get(1)?.as_str().to_string(),
        line,
        address: caps.get(3)?.as_str().to_string(),
    })
}
