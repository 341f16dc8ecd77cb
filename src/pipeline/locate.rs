//! Image source discovery for a single decision.
//!
//! Two sources exist. An external PDF attachment is referenced from the
//! metadata (`OVERHEIDop.externeBijlage`) and needs materializing later.
//! Embedded illustrations are `<illustratie naam="…">` elements in the body
//! and resolve directly against the zoek site. The PDF, when present, always
//! comes first.

use crate::output::{ImageRef, MetadataMap};
use crate::pipeline::records::parse_xml;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error};

static EXB_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"exb-[^/]+").unwrap());

/// Attachment code embedded in an `externeBijlage` reference.
pub fn exb_code(reference: &str) -> Option<&str> {
    EXB_CODE.find(reference).map(|m| m.as_str())
}

/// Download URL of an external attachment.
pub fn pdf_url(repository_base_url: &str, exb_code: &str) -> String {
    format!(
        "{}/externebijlagen/{code}/1/bijlage/{code}.pdf",
        repository_base_url.trim_end_matches('/'),
        code = exb_code
    )
}

/// Derive the ordered image sources of a document.
pub fn locate_images(body: &str, metadata: &MetadataMap, zoek_base_url: &str) -> Vec<ImageRef> {
    let mut images = Vec::new();

    if let Some(code) = metadata.external_attachment().and_then(exb_code) {
        debug!("Found PDF attachment {}", code);
        images.push(ImageRef::ExternalPdf {
            exb_code: code.to_string(),
        });
    }

    images.extend(embedded_images(body, zoek_base_url));
    images
}

fn embedded_images(body: &str, zoek_base_url: &str) -> Vec<ImageRef> {
    let doc = match parse_xml(body, "document body") {
        Ok(doc) => doc,
        Err(e) => {
            error!("{}", e);
            return Vec::new();
        }
    };

    let base = zoek_base_url.trim_end_matches('/');
    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "illustratie")
        .filter_map(|n| n.attribute("naam"))
        .filter(|naam| !naam.is_empty())
        .map(|naam| {
            let url = format!("{base}/{naam}");
            debug!("Found embedded image {}", url);
            ImageRef::Embedded { url }
        })
        .collect()
}
