//! Message segments -- the units an inbound or outbound message is made of.

use serde::{Deserialize, Serialize};

/// One unit of message content.
///
/// The wire encoding of segments belongs to the transport; the core only
/// needs text extraction and @-mention detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    /// Plain text.
    Text(String),
    /// An @-mention of a user.
    At { target: i64 },
    /// An image, referenced by URL.
    Image { url: String },
}

impl Segment {
    /// Shorthand for a text segment.
    pub fn text(s: impl Into<String>) -> Self {
        Segment::Text(s.into())
    }

    /// Concatenate the text content of a segment sequence.
    ///
    /// Non-text segments contribute nothing.
    pub fn text_of(segments: &[Segment]) -> String {
        let mut out = String::new();
        for segment in segments {
            if let Segment::Text(t) = segment {
                out.push_str(t);
            }
        }
        out
    }
}
