use base64::alphabet;
use base64::engine::{self, Engine};
use regex::Regex;

/// Gmail emits url-safe base64 with or without padding depending on the
/// payload, so decoding has to accept both.
const URL_SAFE_LENIENT: engine::GeneralPurpose = engine::GeneralPurpose::new(
    &alphabet::URL_SAFE,
    engine::GeneralPurposeConfig::new()
        .with_decode_padding_mode(engine::DecodePaddingMode::Indifferent),
);

/// One node of a Gmail message payload tree (`messages.get` with format "full").
///
/// A part is either a leaf carrying `inline_data` (url-safe base64) or a
/// container carrying `children`; never both.
#[derive(Debug, Clone, Default)]
pub struct MessagePart {
    pub mime_type: String,
    pub inline_data: Option<String>,
    pub children: Vec<MessagePart>,
}

/// Classification of a part for extraction purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartKind {
    PlainTextLeaf,
    HtmlLeaf,
    Container,
    Unknown,
}

impl MessagePart {
    /// Build a leaf part from already-decoded bytes (encodes them the way
    /// Gmail would hand them back).
    pub fn leaf(mime_type: &str, data: &[u8]) -> Self {
        MessagePart {
            mime_type: mime_type.to_string(),
            inline_data: Some(URL_SAFE_LENIENT.encode(data)),
            children: Vec::new(),
        }
    }

    /// Build a container part from ordered child parts.
    pub fn container(mime_type: &str, children: Vec<MessagePart>) -> Self {
        MessagePart {
            mime_type: mime_type.to_string(),
            inline_data: None,
            children,
        }
    }

    fn kind(&self) -> PartKind {
        match self.mime_type.to_ascii_lowercase().as_str() {
            "text/plain" => PartKind::PlainTextLeaf,
            "text/html" => PartKind::HtmlLeaf,
            _ if !self.children.is_empty() => PartKind::Container,
            _ => PartKind::Unknown,
        }
    }

    fn decoded_text(&self) -> Option<String> {
        let data = self.inline_data.as_ref()?;
        let bytes = URL_SAFE_LENIENT.decode(data.as_bytes()).ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// Flatten a message payload tree into a single plain-text body.
///
/// Plain-text leaves are decoded verbatim, HTML leaves are reduced to their
/// visible text, containers are walked depth-first with empty results
/// dropped and the rest joined by newlines. Parts that match none of these
/// (unknown MIME types, leaves without a decodable payload) contribute
/// nothing; they never abort extraction of their siblings.
pub fn extract(part: &MessagePart) -> String {
    match part.kind() {
        PartKind::PlainTextLeaf => part.decoded_text().unwrap_or_default(),
        PartKind::HtmlLeaf => part
            .decoded_text()
            .map(|html| html_to_text(&html))
            .unwrap_or_default(),
        PartKind::Container => {
            let mut extracted = Vec::new();
            for child in &part.children {
                let text = extract(child);
                if !text.is_empty() {
                    extracted.push(text);
                }
            }
            extracted.join("\n")
        }
        PartKind::Unknown => String::new(),
    }
}

/// Reduce an HTML document to its visible text, one line per block-level
/// element. Tags, attributes and script/style content are dropped; tables
/// contribute their cell text in reading order only.
fn html_to_text(html: &str) -> String {
    let invisible_re = Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>")
        .unwrap();
    let stripped = invisible_re.replace_all(html, "");

    let break_re = Regex::new(
        r"(?i)<br\s*/?>|</(p|div|tr|li|h[1-6]|table|ul|ol|blockquote|title)\s*>",
    )
    .unwrap();
    let with_breaks = break_re.replace_all(&stripped, "\n");

    let tag_re = Regex::new(r"<[^>]+>").unwrap();
    let text = tag_re.replace_all(&with_breaks, "");

    let text = decode_entities(&text);

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_leaf_round_trip() {
        let body = "Your tee time at Blue Water Golf Course is confirmed.\nDate: 05/10/24";
        let part = MessagePart::leaf("text/plain", body.as_bytes());
        assert_eq!(extract(&part), body);
    }

    #[test]
    fn test_html_leaf_visible_text() {
        let html = "<html><head><style>p { color: red; }</style></head>\
                    <body><p>Reservation confirmed</p><p>Total: $42.50</p>\
                    <script>track();</script></body></html>";
        let part = MessagePart::leaf("text/html", html.as_bytes());
        assert_eq!(extract(&part), "Reservation confirmed\nTotal: $42.50");
    }

    #[test]
    fn test_html_table_flattened_to_text_flow() {
        let html = "<table><tr><td>Course</td><td>Blue Water</td></tr>\
                    <tr><td>Players</td><td>2</td></tr></table>";
        let part = MessagePart::leaf("text/html", html.as_bytes());
        assert_eq!(extract(&part), "CourseBlue Water\nPlayers2");
    }

    #[test]
    fn test_html_entities_decoded() {
        let html = "<p>Smith &amp; Sons Golf Club&nbsp;&#39;24</p>";
        let part = MessagePart::leaf("text/html", html.as_bytes());
        assert_eq!(extract(&part), "Smith & Sons Golf Club '24");
    }

    #[test]
    fn test_container_depth_first_order() {
        let tree = MessagePart::container(
            "multipart/mixed",
            vec![
                MessagePart::leaf("text/plain", b"first"),
                MessagePart::container(
                    "multipart/alternative",
                    vec![MessagePart::leaf("text/plain", b"second")],
                ),
                MessagePart::leaf("text/plain", b"third"),
            ],
        );
        assert_eq!(extract(&tree), "first\nsecond\nthird");
    }

    #[test]
    fn test_unknown_parts_skipped_silently() {
        let tree = MessagePart::container(
            "multipart/mixed",
            vec![
                MessagePart::leaf("image/png", &[0x89, 0x50, 0x4e, 0x47]),
                MessagePart::leaf("text/plain", b"kept"),
                MessagePart::leaf("application/pdf", b"%PDF-1.4"),
            ],
        );
        assert_eq!(extract(&tree), "kept");
    }

    #[test]
    fn test_tree_with_no_leaves_yields_empty_string() {
        let empty = MessagePart::container("multipart/mixed", vec![]);
        assert_eq!(extract(&empty), "");

        let nested = MessagePart::container(
            "multipart/mixed",
            vec![MessagePart::container("multipart/alternative", vec![])],
        );
        assert_eq!(extract(&nested), "");
    }

    #[test]
    fn test_leaf_without_payload_yields_empty_string() {
        let part = MessagePart {
            mime_type: "text/plain".to_string(),
            inline_data: None,
            children: Vec::new(),
        };
        assert_eq!(extract(&part), "");
    }

    #[test]
    fn test_invalid_base64_yields_empty_string() {
        let part = MessagePart {
            mime_type: "text/plain".to_string(),
            inline_data: Some("not*valid*base64!".to_string()),
            children: Vec::new(),
        };
        assert_eq!(extract(&part), "");
    }

    #[test]
    fn test_padded_and_unpadded_base64_both_decode() {
        // "golf" encodes to "Z29sZg==" padded, "Z29sZg" unpadded
        for encoded in ["Z29sZg==", "Z29sZg"] {
            let part = MessagePart {
                mime_type: "text/plain".to_string(),
                inline_data: Some(encoded.to_string()),
                children: Vec::new(),
            };
            assert_eq!(extract(&part), "golf");
        }
    }
}
