//! Result types handed back to callers of the ingestion pipeline.
//!
//! Everything here is `Serialize` so a front-end can forward records as JSON
//! unchanged. The JSON shape of a [`DocumentRecord`] is
//! `{id, text, metadata, images[]}` plus an optional `attachment` status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata entry name that denotes an area marking.
pub const AREA_MARKING_KEY: &str = "OVERHEIDop.gebiedsmarkering";

/// Sub-entry name carrying an area marking's geometry (WKT).
pub const GEOMETRY_KEY: &str = "OVERHEIDop.geometrie";

/// Sub-entry name carrying an area marking's label.
pub const GEOMETRY_LABEL_KEY: &str = "OVERHEIDop.geometrieLabel";

/// Metadata entry referencing an externally attached PDF.
pub const EXTERNAL_ATTACHMENT_KEY: &str = "OVERHEIDop.externeBijlage";

/// A geometric annotation attached to a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaMarking {
    /// Marking type as published, e.g. "Lijn" or "Punt".
    #[serde(rename = "type")]
    pub kind: String,
    /// WKT geometry, e.g. `POINT(4.88 52.37)`.
    #[serde(rename = "geometrie", skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A single metadata value: a trimmed scalar, or the area-marking aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    AreaMarkings(Vec<AreaMarking>),
}

/// Flat view of a decision's metadata document.
///
/// Every key maps to [`MetadataValue::Text`] except [`AREA_MARKING_KEY`],
/// which is reserved for the [`MetadataValue::AreaMarkings`] aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataMap(BTreeMap<String, MetadataValue>);

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a scalar entry. Writes to the reserved area-marking key are ignored.
    pub fn insert_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key == AREA_MARKING_KEY {
            return;
        }
        self.0.insert(key, MetadataValue::Text(value.into()));
    }

    /// Store the area-marking aggregate under its reserved key.
    pub fn set_area_markings(&mut self, markings: Vec<AreaMarking>) {
        self.0.insert(
            AREA_MARKING_KEY.to_string(),
            MetadataValue::AreaMarkings(markings),
        );
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    /// Scalar value for `key`, if present and not the aggregate.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(MetadataValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Area markings in source order; empty when none were published.
    pub fn area_markings(&self) -> &[AreaMarking] {
        match self.0.get(AREA_MARKING_KEY) {
            Some(MetadataValue::AreaMarkings(m)) => m,
            _ => &[],
        }
    }

    /// The raw external-attachment reference, if any.
    pub fn external_attachment(&self) -> Option<&str> {
        self.text(EXTERNAL_ATTACHMENT_KEY)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }
}

/// Where an image for a decision comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    /// An illustration embedded in the document; the URL is directly usable.
    Embedded { url: String },
    /// An attached PDF that must be downloaded, rendered and classified.
    ExternalPdf { exb_code: String },
    /// A rendered attachment page stored locally, as a site-relative path.
    Materialized { path: String },
}

impl ImageRef {
    pub fn is_external_pdf(&self) -> bool {
        matches!(self, ImageRef::ExternalPdf { .. })
    }
}

/// What happened to a decision's PDF attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttachmentStatus {
    /// Located but not materialized yet.
    Pending,
    /// First page rendered, classified as a target and stored.
    Saved { path: String },
    /// First page rendered but the classifier turned it down.
    Rejected { label: String, confidence: f32 },
    /// Download, rendering or classification failed.
    Unavailable { reason: String },
}

/// One ingested traffic decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Identifier derived from the content URL, e.g. `gmb-2024-12345`.
    pub id: String,
    /// Plain text of the document body.
    pub text: String,
    pub metadata: MetadataMap,
    /// PDF attachment first (if any), then embedded illustrations in document order.
    pub images: Vec<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentStatus>,
}

impl DocumentRecord {
    /// The attachment code of a pending PDF in the first image slot.
    pub fn pending_exb_code(&self) -> Option<&str> {
        match self.images.first() {
            Some(ImageRef::ExternalPdf { exb_code }) => Some(exb_code.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_key_cannot_be_overwritten_by_text() {
        let mut m = MetadataMap::new();
        m.set_area_markings(vec![AreaMarking {
            kind: "Lijn".into(),
            geometry: None,
            label: None,
        }]);
        m.insert_text(AREA_MARKING_KEY, "Lijn");
        assert_eq!(m.area_markings().len(), 1);
        assert_eq!(m.text(AREA_MARKING_KEY), None);
    }

    #[test]
    fn record_serialises_to_flat_shape() {
        let mut metadata = MetadataMap::new();
        metadata.insert_text("DC.title", "Verkeersbesluit Hoofdweg");
        let record = DocumentRecord {
            id: "gmb-2024-1".into(),
            text: "tekst".into(),
            metadata,
            images: vec![ImageRef::Embedded {
                url: "https://zoek.officielebekendmakingen.nl/a.png".into(),
            }],
            attachment: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["metadata"]["DC.title"], "Verkeersbesluit Hoofdweg");
        assert_eq!(json["images"][0]["kind"], "embedded");
        assert!(json.get("attachment").is_none());
    }
}
