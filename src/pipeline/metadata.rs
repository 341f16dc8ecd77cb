//! Metadata document parsing.
//!
//! KOOP metadata is a flat list of `<metadata name="…" content="…"/>`
//! elements. Area markings are the one nested shape:
//!
//! ```xml
//! <metadata name="OVERHEIDop.gebiedsmarkering" content="Lijn">
//!   <metadata name="OVERHEIDop.geometrie" content="POINT(4.88 52.37)"/>
//!   <metadata name="OVERHEIDop.geometrieLabel" content="Hoofdweg"/>
//! </metadata>
//! ```

use crate::error::IngestError;
use crate::output::{AreaMarking, MetadataMap, AREA_MARKING_KEY, GEOMETRY_KEY, GEOMETRY_LABEL_KEY};
use crate::pipeline::records::{as_utf8, parse_xml};
use roxmltree::Node;

fn metadata_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(|n| n.is_element() && n.tag_name().name() == "metadata")
}

/// Parse a metadata document into a [`MetadataMap`].
///
/// Only direct `metadata` children of the root are read. Scalar entries
/// missing a name or a non-empty content are skipped; content is trimmed.
pub fn parse_metadata(body: &[u8]) -> Result<MetadataMap, IngestError> {
    let text = as_utf8(body, "metadata")?;
    let doc = parse_xml(text, "metadata")?;

    let mut metadata = MetadataMap::new();
    let mut markings = Vec::new();

    for entry in metadata_children(doc.root_element()) {
        let name = entry.attribute("name");
        let content = entry.attribute("content");

        if name == Some(AREA_MARKING_KEY) {
            markings.push(parse_area_marking(entry, content));
            continue;
        }

        if let (Some(name), Some(content)) = (name, content) {
            if !name.is_empty() && !content.is_empty() {
                metadata.insert_text(name, content.trim());
            }
        }
    }

    if !markings.is_empty() {
        metadata.set_area_markings(markings);
    }
    Ok(metadata)
}

fn parse_area_marking(entry: Node<'_, '_>, kind: Option<&str>) -> AreaMarking {
    let mut marking = AreaMarking {
        kind: kind.unwrap_or_default().to_string(),
        geometry: None,
        label: None,
    };
    for sub in metadata_children(entry) {
        let content = sub.attribute("content").map(str::to_string);
        match sub.attribute("name") {
            Some(GEOMETRY_KEY) => marking.geometry = content,
            Some(GEOMETRY_LABEL_KEY) => marking.label = content,
            _ => {}
        }
    }
    marking
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MetadataValue;

    const META: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata_gegevens>
  <metadata name="DC.title" content="  Verkeersbesluit Hoofdweg  "/>
  <metadata name="OVERHEIDop.gebiedsmarkering" content="Lijn">
    <metadata name="OVERHEIDop.geometrie" content="POINT(4.88 52.37)"/>
    <metadata name="OVERHEIDop.geometrieLabel" content="Hoofdweg"/>
  </metadata>
  <metadata name="DC.creator" content=""/>
  <metadata content="zonder naam"/>
  <metadata name="OVERHEIDop.gebiedsmarkering" content="Punt">
    <metadata name="OVERHEIDop.geometrie" content="POINT(5.12 52.09)"/>
  </metadata>
  <metadata name="OVERHEIDop.externeBijlage" content="exb-2024-67890"/>
</metadata_gegevens>"#;

    #[test]
    fn collects_area_markings_in_order() {
        let m = parse_metadata(META.as_bytes()).unwrap();
        let markings = m.area_markings();
        assert_eq!(markings.len(), 2);
        assert_eq!(markings[0].kind, "Lijn");
        assert_eq!(markings[0].geometry.as_deref(), Some("POINT(4.88 52.37)"));
        assert_eq!(markings[0].label.as_deref(), Some("Hoofdweg"));
        assert_eq!(markings[1].kind, "Punt");
        assert_eq!(markings[1].label, None);
    }

    #[test]
    fn scalars_are_trimmed_and_incomplete_entries_skipped() {
        let m = parse_metadata(META.as_bytes()).unwrap();
        assert_eq!(m.text("DC.title"), Some("Verkeersbesluit Hoofdweg"));
        assert!(m.get("DC.creator").is_none());
        assert_eq!(m.external_attachment(), Some("exb-2024-67890"));
        // title, externeBijlage, aggregate
        assert_eq!(m.len(), 3);
        assert!(matches!(
            m.get(AREA_MARKING_KEY),
            Some(MetadataValue::AreaMarkings(_))
        ));
    }

    #[test]
    fn no_markings_means_no_reserved_key() {
        let m = parse_metadata(br#"<m><metadata name="a" content="b"/></m>"#).unwrap();
        assert!(m.get(AREA_MARKING_KEY).is_none());
        assert!(m.area_markings().is_empty());
    }

    #[test]
    fn malformed_metadata_is_parse_error() {
        assert!(parse_metadata(b"<m><metadata").is_err());
    }
}
