use async_trait::async_trait;
use flate2::read::GzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use super::{fetch, Probe, ProbeError};
use crate::models::{ProbeKind, ProbeResult};

/// The catalog itself is malformed. This is the monitored condition, so it
/// surfaces as `valid = false` rather than as a [`ProbeError`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructuralParseError {
    #[error("text in document at byte {0}")]
    TextOutsideTags(u64),
    #[error("{0} element(s) left unclosed at end of document")]
    Unclosed(usize),
    #[error("malformed markup: {0}")]
    Malformed(String),
}

/// Downloads the gzip-compressed map catalog and counts its map entries.
pub struct IndexValidityProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl IndexValidityProbe {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self { client, url: url.into(), timeout }
    }
}

#[async_trait]
impl Probe for IndexValidityProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::IndexValidity
    }

    async fn run(&self) -> Result<ProbeResult, ProbeError> {
        let compressed = fetch(&self.client, &self.url, self.timeout).await?.bytes().await?;
        let document = gunzip(&compressed)?;
        Ok(match count_maps(&document) {
            Ok(map_count) => ProbeResult::IndexValidity { valid: true, map_count },
            Err(e) => {
                warn!(url = %self.url, error = %e, "map index failed validation");
                ProbeResult::IndexValidity { valid: false, map_count: 0 }
            }
        })
    }
}

/// Raw catalog bytes. Text encoding is not checked here: region names in
/// other encodings must not turn a valid catalog into a fetch failure.
pub fn gunzip(compressed: &[u8]) -> Result<Vec<u8>, ProbeError> {
    let mut document = Vec::new();
    GzDecoder::new(compressed).read_to_end(&mut document)?;
    Ok(document)
}

/// Counts elements whose first attribute value is `map`.
///
/// Any non-whitespace character data fails the whole document. Elements
/// without attributes are not map entries. Attribute values and text are
/// compared as raw bytes, so non-UTF-8 names are accepted.
pub fn count_maps(document: &[u8]) -> Result<u32, StructuralParseError> {
    let mut reader = Reader::from_reader(document);
    let mut count = 0;
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                count += u32::from(is_map_entry(&e)?);
            }
            Ok(Event::Empty(e)) => count += u32::from(is_map_entry(&e)?),
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Text(text)) => {
                if !text.iter().all(u8::is_ascii_whitespace) {
                    return Err(StructuralParseError::TextOutsideTags(reader.buffer_position() as u64));
                }
            }
            Ok(Event::CData(data)) => {
                if !data.iter().all(u8::is_ascii_whitespace) {
                    return Err(StructuralParseError::TextOutsideTags(reader.buffer_position() as u64));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(StructuralParseError::Malformed(e.to_string())),
        }
    }

    if depth != 0 {
        return Err(StructuralParseError::Unclosed(depth));
    }
    Ok(count)
}

fn is_map_entry(element: &BytesStart<'_>) -> Result<bool, StructuralParseError> {
    match element.attributes().next() {
        Some(Ok(attr)) => Ok(attr.value.as_ref() == b"map"),
        Some(Err(e)) => Err(StructuralParseError::Malformed(e.to_string())),
        None => Ok(false),
    }
}
