//! Append-only targets for form encoding.

use bytes::Bytes;

/// One appended form part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    /// Textual part.
    Text(String),
    /// Binary part; only produced for binary-capable sinks.
    Bytes(Bytes),
}

impl FormPart {
    /// The part as text. Binary parts are rendered lossily.
    #[must_use]
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            FormPart::Text(s) => std::borrow::Cow::Borrowed(s),
            FormPart::Bytes(b) => String::from_utf8_lossy(b),
        }
    }
}

/// An append-only multi-value key/part map.
///
/// The capability split is checked once at the encoder boundary: a sink that
/// does not [`supports_binary`](FormSink::supports_binary) never receives
/// [`FormPart::Bytes`] - the encoder rejects binary leaves with an
/// unsupported-type error instead.
pub trait FormSink {
    /// Appends one part under `key`. Keys repeat freely.
    fn append(&mut self, key: &str, part: FormPart);

    /// Whether the sink can carry binary parts.
    fn supports_binary(&self) -> bool {
        false
    }
}

/// In-memory entry list, the multipart-shaped sink.
///
/// Iterable, so it feeds straight into
/// [`form_data_to_json`](super::form_data_to_json).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormEntries {
    entries: Vec<(String, FormPart)>,
}

impl FormEntries {
    /// Creates an empty entry list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected entries, in append order.
    #[must_use]
    pub fn entries(&self) -> &[(String, FormPart)] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing was appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FormSink for FormEntries {
    fn append(&mut self, key: &str, part: FormPart) {
        self.entries.push((key.to_string(), part));
    }

    fn supports_binary(&self) -> bool {
        true
    }
}

impl IntoIterator for FormEntries {
    type Item = (String, FormPart);
    type IntoIter = std::vec::IntoIter<(String, FormPart)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Text-only sink rendering `application/x-www-form-urlencoded` output.
#[derive(Debug, Clone, Default)]
pub struct UrlEncodedSink {
    pairs: Vec<(String, String)>,
}

impl UrlEncodedSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the collected pairs as a percent-encoded query string.
    #[must_use]
    pub fn serialize(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl FormSink for UrlEncodedSink {
    fn append(&mut self, key: &str, part: FormPart) {
        // The encoder's capability check keeps binary parts out; a caller
        // appending bytes directly gets a lossy textual rendering.
        self.pairs.push((key.to_string(), part.as_text().into_owned()));
    }
}
