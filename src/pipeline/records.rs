//! SRU search-response parsing.
//!
//! A `searchRetrieveResponse` lists one `sru:recordData` per hit. Each hit
//! carries a set of `gzd:itemUrl` elements tagged by `manifestation`; we keep
//! the `xml` manifestation (document body) and the `metadata` one.

use crate::error::IngestError;
use roxmltree::{Document, ParsingOptions};
use tracing::debug;

/// SRU 2.0 response namespace.
pub const SRU_NS: &str = "http://docs.oasis-open.org/ns/search-ws/sruResponse";

/// KOOP "gzd" record namespace.
pub const GZD_NS: &str = "http://standaarden.overheid.nl/sru";

/// Where to fetch one search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub content_url: String,
    pub metadata_url: Option<String>,
}

impl RecordRef {
    /// Decision id: the last path segment of the content URL without `.xml`.
    pub fn document_id(&self) -> String {
        self.content_url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .replace(".xml", "")
    }
}

/// Parse bytes as XML, allowing the DTD declarations some KOOP documents carry.
pub(crate) fn parse_xml<'a>(text: &'a str, context: &str) -> Result<Document<'a>, IngestError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(text, options).map_err(|e| IngestError::Parse {
        context: context.to_string(),
        detail: e.to_string(),
    })
}

pub(crate) fn as_utf8<'a>(body: &'a [u8], context: &str) -> Result<&'a str, IngestError> {
    std::str::from_utf8(body).map_err(|e| IngestError::Parse {
        context: context.to_string(),
        detail: e.to_string(),
    })
}

/// Extract `(content, metadata)` URL pairs from a search response, in
/// response order. Hits without an `xml` manifestation are dropped.
pub fn extract_records(body: &[u8]) -> Result<Vec<RecordRef>, IngestError> {
    let text = as_utf8(body, "search response")?;
    let doc = parse_xml(text, "search response")?;

    let records: Vec<RecordRef> = doc
        .descendants()
        .filter(|n| n.has_tag_name((SRU_NS, "recordData")))
        .filter_map(|record| {
            let mut content_url = None;
            let mut metadata_url = None;
            for item in record
                .descendants()
                .filter(|n| n.has_tag_name((GZD_NS, "itemUrl")))
            {
                let url = item.text().map(|t| t.trim().to_string());
                match item.attribute("manifestation") {
                    Some("xml") => content_url = url,
                    Some("metadata") => metadata_url = url,
                    _ => {}
                }
            }
            let content_url = content_url.filter(|u| !u.is_empty())?;
            Some(RecordRef {
                content_url,
                metadata_url: metadata_url.filter(|u| !u.is_empty()),
            })
        })
        .collect();

    debug!("Extracted {} records", records.len());
    Ok(records)
}

/// All text of an XML document joined with single spaces. Empty when the
/// body is not well-formed.
pub fn extract_plain_text(body: &str) -> String {
    match parse_xml(body, "document body") {
        Ok(doc) => doc
            .descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string(),
        Err(e) => {
            tracing::error!("{}", e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sru:searchRetrieveResponse xmlns:sru="http://docs.oasis-open.org/ns/search-ws/sruResponse"
    xmlns:gzd="http://standaarden.overheid.nl/sru">
  <sru:numberOfRecords>3</sru:numberOfRecords>
  <sru:records>
    <sru:record><sru:recordData><gzd:gzd><gzd:enrichedData>
      <gzd:itemUrl manifestation="metadata">https://repo/gmb-2024-1/metadata.xml</gzd:itemUrl>
      <gzd:itemUrl manifestation="xml">https://repo/gmb-2024-1/gmb-2024-1.xml</gzd:itemUrl>
      <gzd:itemUrl manifestation="html">https://repo/gmb-2024-1/gmb-2024-1.html</gzd:itemUrl>
    </gzd:enrichedData></gzd:gzd></sru:recordData></sru:record>
    <sru:record><sru:recordData><gzd:gzd><gzd:enrichedData>
      <gzd:itemUrl manifestation="metadata">https://repo/gmb-2024-2/metadata.xml</gzd:itemUrl>
    </gzd:enrichedData></gzd:gzd></sru:recordData></sru:record>
    <sru:record><sru:recordData><gzd:gzd><gzd:enrichedData>
      <gzd:itemUrl manifestation="xml">https://repo/gmb-2024-3/gmb-2024-3.xml</gzd:itemUrl>
    </gzd:enrichedData></gzd:gzd></sru:recordData></sru:record>
  </sru:records>
</sru:searchRetrieveResponse>"#;

    #[test]
    fn keeps_records_with_content_in_order() {
        let records = extract_records(SEARCH.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content_url, "https://repo/gmb-2024-1/gmb-2024-1.xml");
        assert_eq!(
            records[0].metadata_url.as_deref(),
            Some("https://repo/gmb-2024-1/metadata.xml")
        );
        assert_eq!(records[1].document_id(), "gmb-2024-3");
        assert_eq!(records[1].metadata_url, None);
    }

    #[test]
    fn parsing_is_repeatable() {
        let a = extract_records(SEARCH.as_bytes()).unwrap();
        let b = extract_records(SEARCH.as_bytes()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unprefixed_elements_do_not_match() {
        let xml = r#"<searchRetrieveResponse><recordData>
            <itemUrl manifestation="xml">https://repo/a.xml</itemUrl>
        </recordData></searchRetrieveResponse>"#;
        assert!(extract_records(xml.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn malformed_response_is_parse_error() {
        let err = extract_records(b"<sru:searchRetrieveResponse>").unwrap_err();
        assert!(matches!(err, IngestError::Parse { .. }));
    }

    #[test]
    fn plain_text_joins_text_nodes() {
        let text = extract_plain_text("<besluit><titel>Besluit</titel><al>Hoofdweg afsluiten</al></besluit>");
        assert_eq!(text, "Besluit Hoofdweg afsluiten");
        assert_eq!(extract_plain_text("<open>"), "");
    }
}
