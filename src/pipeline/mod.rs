//! Pipeline stages for traffic-decision ingestion.
//!
//! Each submodule implements one step and can be tested on its own bytes.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ records ──▶ fetch ──▶ metadata ──▶ locate
//! (SRU)     (XML)       (docs)    (XML)        (images, exb codes)
//!
//! exb code ──▶ fetch ──▶ render ──▶ encode ──▶ classify
//!              (PDF)     (pdfium)   (PNG)      (VLM)
//! ```
//!
//! 1. [`fetch`]: rate-limited HTTP GET, the only stage that talks to the
//!    repository
//! 2. [`records`]: pull (content URL, metadata URL) pairs out of an SRU
//!    response
//! 3. [`metadata`]: flatten a metadata document into a key/value map
//! 4. [`locate`]: collect embedded illustrations and external PDF codes
//! 5. [`render`]: rasterise the first PDF page; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 6. [`encode`]: PNG-encode a page and wrap it for the multimodal request
//! 7. [`classify`]: decide whether a page is a map or aerial photo

pub mod classify;
pub mod encode;
pub mod fetch;
pub mod locate;
pub mod metadata;
pub mod records;
pub mod render;
