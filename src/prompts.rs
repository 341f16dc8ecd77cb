//! Prompts for the vision classifier.
//!
//! Kept in one place so the label vocabulary the prompt promises and the
//! labels [`crate::pipeline::classify`] accepts cannot drift apart.

/// Labels counted as a positive verdict.
pub const TARGET_LABELS: &[&str] = &["map", "aerial_photo"];

/// System prompt asking for a single JSON verdict per image.
pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You classify images attached to Dutch municipal traffic decisions (verkeersbesluiten).

Decide which ONE of these labels fits the image best:
- map            a street map, situation drawing, or road layout plan
- aerial_photo   an aerial or satellite photograph, with or without annotations
- document       a scanned page of text, a letter, or a form
- sign           a photo or drawing of a traffic sign
- other          anything else

Respond with ONLY a JSON object, no prose and no code fences:
{"label": "<one of the labels above>", "confidence": <number between 0 and 1>}"#;

/// User turn accompanying the image.
pub const CLASSIFIER_USER_PROMPT: &str = "Classify this image.";
