//! Documents and pages as seen by the summarisation pipeline.
//!
//! A [`Document`] is an ordered list of [`Page`]s. Every page carries a
//! content fingerprint computed from its payload alone, so the same cover
//! page appearing in two different reports maps to the same cache entry.

use serde::{Deserialize, Serialize};

/// BLAKE3 lowercase-hex fingerprint of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Raw content of one page before text extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePayload {
    /// Embedded (digitally generated) text.
    Text(String),
    /// PNG-encoded page image; needs OCR.
    Image(Vec<u8>),
    /// Embedded text plus a rendered image for OCR merging.
    TextAndImage { text: String, image: Vec<u8> },
    /// A page with no text layer that could not be rasterised.
    Unreadable { detail: String },
}

impl PagePayload {
    /// Fingerprint of the payload bytes.
    ///
    /// The variant tag is hashed too so a text page and an image page whose
    /// bytes happen to coincide never share an entry.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        match self {
            PagePayload::Text(text) => {
                hasher.update(b"text\0");
                hasher.update(text.as_bytes());
            }
            PagePayload::Image(png) => {
                hasher.update(b"image\0");
                hasher.update(png);
            }
            PagePayload::TextAndImage { text, image } => {
                hasher.update(b"text+image\0");
                hasher.update(&(text.len() as u64).to_le_bytes());
                hasher.update(text.as_bytes());
                hasher.update(image);
            }
            PagePayload::Unreadable { detail } => {
                hasher.update(b"unreadable\0");
                hasher.update(detail.as_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    /// The embedded text, if any.
    pub fn embedded_text(&self) -> Option<&str> {
        match self {
            PagePayload::Text(text) | PagePayload::TextAndImage { text, .. } => Some(text),
            PagePayload::Image(_) | PagePayload::Unreadable { .. } => None,
        }
    }

    /// The rendered image, if any.
    pub fn image(&self) -> Option<&[u8]> {
        match self {
            PagePayload::Image(png) | PagePayload::TextAndImage { image: png, .. } => Some(png),
            PagePayload::Text(_) | PagePayload::Unreadable { .. } => None,
        }
    }
}

/// A single page.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based page number.
    pub index: usize,
    pub payload: PagePayload,
    /// Content fingerprint of `payload`; the extraction-cache key.
    pub fingerprint: String,
}

impl Page {
    pub fn new(index: usize, payload: PagePayload) -> Self {
        let fingerprint = payload.fingerprint();
        Self {
            index,
            payload,
            fingerprint,
        }
    }
}

/// An ordered sequence of pages identified by a content fingerprint.
#[derive(Debug, Clone)]
pub struct Document {
    /// Fingerprint of the raw source bytes.
    pub fingerprint: String,
    pub pages: Vec<Page>,
}

impl Document {
    /// Build a document from pages already in reading order.
    ///
    /// Page indices are renumbered 1..=n so ordering is always stable.
    pub fn new(fingerprint: impl Into<String>, payloads: Vec<PagePayload>) -> Self {
        let pages = payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| Page::new(i + 1, payload))
            .collect();
        Self {
            fingerprint: fingerprint.into(),
            pages,
        }
    }

    /// Build a text-only document; the fingerprint covers every page's text.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let payloads: Vec<PagePayload> = texts
            .into_iter()
            .map(|t| PagePayload::Text(t.into()))
            .collect();
        let mut hasher = blake3::Hasher::new();
        for p in &payloads {
            if let PagePayload::Text(t) = p {
                hasher.update(&(t.len() as u64).to_le_bytes());
                hasher.update(t.as_bytes());
            }
        }
        let fp = hasher.finalize().to_hex().to_string();
        Self::new(fp, payloads)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// How a page's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    EmbeddedText,
    OpticalCharacterRecognition,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionMethod::EmbeddedText => f.write_str("embedded-text"),
            ExtractionMethod::OpticalCharacterRecognition => {
                f.write_str("optical-character-recognition")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_numbered_from_one() {
        let doc = Document::from_texts(["a", "b", "c"]);
        let indices: Vec<usize> = doc.pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(doc.len(), 3);
    }

    #[test]
    fn identical_pages_share_fingerprint_across_documents() {
        let a = Document::from_texts(["Cover page", "Alpha"]);
        let b = Document::from_texts(["Cover page", "Beta"]);
        assert_eq!(a.pages[0].fingerprint, b.pages[0].fingerprint);
        assert_ne!(a.pages[1].fingerprint, b.pages[1].fingerprint);
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn payload_kind_changes_fingerprint() {
        let text = PagePayload::Text("abc".into());
        let image = PagePayload::Image(b"abc".to_vec());
        assert_ne!(text.fingerprint(), image.fingerprint());
    }

    #[test]
    fn document_fingerprint_respects_page_boundaries() {
        let a = Document::from_texts(["ab", "c"]);
        let b = Document::from_texts(["a", "bc"]);
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn fingerprint_is_lowercase_hex() {
        let fp = fingerprint(b"hello");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn payload_accessors() {
        let p = PagePayload::TextAndImage {
            text: "t".into(),
            image: vec![1, 2],
        };
        assert_eq!(p.embedded_text(), Some("t"));
        assert_eq!(p.image(), Some(&[1u8, 2][..]));
        assert_eq!(PagePayload::Image(vec![]).embedded_text(), None);
    }
}
