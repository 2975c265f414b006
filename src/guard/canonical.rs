//! Canonical payload production for request signing.
//!
//! A request's parameter bag is reduced to one byte sequence before hashing:
//!
//! 1. the signature field is dropped,
//! 2. the remaining keys are put in natural ascending order
//!    (`item2` < `item10`),
//! 3. the ordered map is written as compact JSON using the escaping rules of
//!    PHP's `json_encode` (`/` as `\/`, non-ASCII as lowercase `\uXXXX`).
//!
//! The escaping matters: existing clients compute their digest over
//! `json_encode` output, so any divergence here is a signature mismatch.

use std::cmp::Ordering;
use std::io;

use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};

/// Bytes produced by [`Canonicalizer::canonicalize`].
///
/// The inner buffer is private; the only way to obtain one is through the
/// canonicalizer, so anything that hashes a `CanonicalPayload` hashes the
/// agreed encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPayload(Vec<u8>);

impl CanonicalPayload {
    /// Access the bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The payload as text. The formatter only emits ASCII.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Returns the length of the payload in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalPayload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Serializes parameter bags into [`CanonicalPayload`]s.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    signature_field: String,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new("signature")
    }
}

impl Canonicalizer {
    /// Create a canonicalizer that excludes `signature_field` from the payload.
    pub fn new(signature_field: impl Into<String>) -> Self {
        Self {
            signature_field: signature_field.into(),
        }
    }

    /// Name of the excluded signature field.
    pub fn signature_field(&self) -> &str {
        &self.signature_field
    }

    /// Produce the canonical payload for `params`.
    ///
    /// The caller's map is only borrowed; ordering happens on a local vector
    /// of references.
    pub fn canonicalize(
        &self,
        params: &Map<String, Value>,
    ) -> Result<CanonicalPayload, serde_json::Error> {
        let mut entries: Vec<(&str, &Value)> = params
            .iter()
            .filter(|(key, _)| key.as_str() != self.signature_field)
            .map(|(key, value)| (key.as_str(), value))
            .collect();
        entries.sort_by(|(a, _), (b, _)| natural_cmp(a, b));

        let mut buf = Vec::with_capacity(64 + entries.len() * 24);
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PhpJsonFormatter);
        OrderedParams(&entries).serialize(&mut serializer)?;

        Ok(CanonicalPayload(buf))
    }
}

/// Sorted entries, written as an object, or as an array when the keys are
/// exactly `0..n` (which is how `json_encode` treats list-shaped arrays,
/// including the empty one).
struct OrderedParams<'a>(&'a [(&'a str, &'a Value)]);

impl OrderedParams<'_> {
    fn is_list(&self) -> bool {
        self.0
            .iter()
            .enumerate()
            .all(|(index, (key, _))| *key == index.to_string())
    }
}

impl Serialize for OrderedParams<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_list() {
            let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
            for (_, value) in self.0 {
                seq.serialize_element(value)?;
            }
            return seq.end();
        }

        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Compact JSON formatter matching `json_encode` default flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhpJsonFormatter;

impl Formatter for PhpJsonFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if ch != '/' && ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            if ch == '/' {
                writer.write_all(b"\\/")?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Natural string ordering.
///
/// Runs of ASCII digits compare by numeric value, everything else compares
/// bytewise. Keys that are naturally equal (`a01` vs `a1`) fall back to
/// plain lexicographic order so the result is a total order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (left, right) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < left.len() && j < right.len() {
        if left[i].is_ascii_digit() && right[j].is_ascii_digit() {
            let left_end = digit_run_end(left, i);
            let right_end = digit_run_end(right, j);
            match compare_digit_runs(&left[i..left_end], &right[j..right_end]) {
                Ordering::Equal => {
                    i = left_end;
                    j = right_end;
                }
                ord => return ord,
            }
        } else {
            match left[i].cmp(&right[j]) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                ord => return ord,
            }
        }
    }

    (left.len() - i)
        .cmp(&(right.len() - j))
        .then_with(|| a.cmp(b))
}

fn digit_run_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| !b.is_ascii_digit())
        .map_or(bytes.len(), |offset| start + offset)
}

fn compare_digit_runs(left: &[u8], right: &[u8]) -> Ordering {
    let left = trim_leading_zeros(left);
    let right = trim_leading_zeros(right);
    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
}

fn trim_leading_zeros(run: &[u8]) -> &[u8] {
    let zeros = run.iter().take_while(|&&b| b == b'0').count();
    &run[zeros..]
}
