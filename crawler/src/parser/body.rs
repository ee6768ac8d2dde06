//! Body selection and decoding.

use base64::{
    alphabet,
    engine::{general_purpose::GeneralPurposeConfig, DecodePaddingMode, GeneralPurpose},
    Engine,
};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

use crate::email::raw_message::MessagePart;

use super::normalizer::Normalizer;

/// Gmail sends url-safe base64, with or without padding
const GMAIL_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

lazy_static! {
    static ref RE_WORD: Regex = Regex::new(r"[a-zA-Z']{2,}").unwrap();
    static ref SEL_BODY: Selector = Selector::parse("body").unwrap();
    static ref SEL_QUOTE: Selector = Selector::parse("div.gmail_quote").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeKind {
    TextPlain,
    TextHtml,
    Multipart,
    Other,
}

impl MimeKind {
    pub fn of(mime_type: &str) -> Self {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if mime_type == "text/plain" {
            MimeKind::TextPlain
        } else if mime_type == "text/html" {
            MimeKind::TextHtml
        } else if mime_type.contains("multipart") {
            MimeKind::Multipart
        } else {
            MimeKind::Other
        }
    }
}

/// Encoded body per mimetype, in order of first appearance.
///
/// A multipart payload is walked depth first: a nested `multipart/*` part is listed
/// itself and its children follow it. A mimetype seen again keeps its first position
/// and takes the later body. A non-multipart payload is its own single entry.
pub fn collect_bodies(payload: &MessagePart) -> IndexMap<String, String> {
    let mut bodies = IndexMap::new();
    if MimeKind::of(&payload.mime_type) == MimeKind::Multipart {
        collect_parts(&payload.parts, &mut bodies);
    } else {
        bodies.insert(payload.mime_type.clone(), payload.data().to_string());
    }
    bodies
}

fn collect_parts(parts: &[MessagePart], bodies: &mut IndexMap<String, String>) {
    for part in parts {
        bodies.insert(part.mime_type.clone(), part.data().to_string());
        if MimeKind::of(&part.mime_type) == MimeKind::Multipart {
            collect_parts(&part.parts, bodies);
        }
    }
}

/// Parsed bodies; at most one of the two is filled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedBody {
    pub text_body: String,
    pub html_body: String,
}

pub fn select_body(
    bodies: &IndexMap<String, String>,
    normalizer: &Normalizer,
    message_id: &str,
) -> SelectedBody {
    let find = |kind: MimeKind| {
        bodies
            .iter()
            .find(|(mime, _)| MimeKind::of(mime) == kind)
            .map(|(_, data)| data.as_str())
    };

    if let Some(data) = find(MimeKind::TextPlain) {
        SelectedBody {
            text_body: parse_plaintext(data, normalizer, message_id),
            ..Default::default()
        }
    } else if let Some(data) = find(MimeKind::TextHtml) {
        SelectedBody {
            html_body: parse_html(data, message_id),
            ..Default::default()
        }
    } else {
        SelectedBody::default()
    }
}

fn decode(data: &str, message_id: &str) -> Option<String> {
    let bytes = match GMAIL_BASE64.decode(data.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Message {}: body is not valid base64: {}", message_id, e);
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!("Message {}: body is not valid UTF-8: {}", message_id, e);
            None
        }
    }
}

pub fn parse_plaintext(data: &str, normalizer: &Normalizer, message_id: &str) -> String {
    decode(data, message_id)
        .map(|text| clean_plaintext(&text, normalizer))
        .unwrap_or_default()
}

/// Normalize, then keep alphabetic words of two or more letters
pub fn clean_plaintext(text: &str, normalizer: &Normalizer) -> String {
    let normalized = normalizer.normalize(text).to_lowercase();
    RE_WORD
        .find_iter(&normalized)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse_html(data: &str, message_id: &str) -> String {
    decode(data, message_id)
        .map(|html| visible_text(&html))
        .unwrap_or_default()
}

/// Visible text of `<body>` without the first quoted reply block, styles or scripts
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Some(body) = document.select(&SEL_BODY).next() else {
        return String::new();
    };
    let quote_id = body.select(&SEL_QUOTE).next().map(|q| q.id());

    body.descendants()
        .filter(|node| {
            !node.ancestors().any(|a| {
                Some(a.id()) == quote_id
                    || a.value()
                        .as_element()
                        .map(|e| matches!(e.name(), "style" | "script"))
                        .unwrap_or(false)
            })
        })
        .filter_map(|node| node.value().as_text())
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::raw_message::MessagePartBody;

    fn encode(text: &str) -> String {
        GMAIL_BASE64.encode(text)
    }

    fn part(mime_type: &str, data: &str) -> MessagePart {
        MessagePart {
            mime_type: mime_type.to_string(),
            body: Some(MessagePartBody {
                data: Some(data.to_string()),
                size: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_collect_bodies_keeps_first_appearance_order() {
        let payload = MessagePart {
            mime_type: "multipart/mixed".to_string(),
            parts: vec![
                MessagePart {
                    mime_type: "multipart/alternative".to_string(),
                    parts: vec![part("text/plain", "cA"), part("text/html", "aA")],
                    ..Default::default()
                },
                part("application/pdf", "JVBE"),
            ],
            ..Default::default()
        };

        let bodies = collect_bodies(&payload);
        let keys: Vec<_> = bodies.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["multipart/alternative", "text/plain", "text/html", "application/pdf"]
        );
        assert_eq!(bodies["text/plain"], "cA");
    }

    #[test]
    fn test_repeated_mimetype_keeps_position_takes_later_body() {
        let payload = MessagePart {
            mime_type: "multipart/mixed".to_string(),
            parts: vec![
                part("text/html", "aA"),
                part("text/plain", "first"),
                MessagePart {
                    mime_type: "multipart/related".to_string(),
                    parts: vec![part("text/plain", "nested")],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let bodies = collect_bodies(&payload);
        let keys: Vec<_> = bodies.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["text/html", "text/plain", "multipart/related"]);
        assert_eq!(bodies["text/plain"], "nested");
    }

    #[test]
    fn test_single_part_payload() {
        let bodies = collect_bodies(&part("text/html", "aA"));
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies["text/html"], "aA");
    }

    #[test]
    fn test_plaintext_preferred_over_html() {
        let mut bodies = IndexMap::new();
        bodies.insert("text/html".to_string(), encode("<p>html</p>"));
        bodies.insert("text/plain".to_string(), encode("Plain words here"));

        let selected = select_body(&bodies, &Normalizer::plaintext(), "m1");
        assert_eq!(selected.text_body, "plain words here");
        assert_eq!(selected.html_body, "");
    }

    #[test]
    fn test_html_visible_text() {
        let html = concat!(
            "<html><head><style>p { color: red; }</style></head>",
            "<body><p>Hello  <b>There</b></p><script>var x = 1;</script>",
            "<div class=\"gmail_quote\">On Mon someone wrote: old</div>",
            "<div>Bye</div></body></html>"
        );
        assert_eq!(visible_text(html), "hello there bye");
    }

    #[test]
    fn test_html_body_selected_when_no_plaintext() {
        let mut bodies = IndexMap::new();
        bodies.insert("text/html".to_string(), encode("<body><p>Hi Bob</p></body>"));

        let selected = select_body(&bodies, &Normalizer::plaintext(), "m1");
        assert_eq!(selected.html_body, "hi bob");
        assert_eq!(selected.text_body, "");
    }

    #[test]
    fn test_bad_base64_leaves_body_empty() {
        assert_eq!(parse_plaintext("***", &Normalizer::plaintext(), "m1"), "");
        assert_eq!(parse_html("***", "m1"), "");
    }

    #[test]
    fn test_clean_plaintext_filters_words() {
        let text = "Hi Sam,\r\nIt's 5pm - call me at x2!";
        assert_eq!(
            clean_plaintext(text, &Normalizer::plaintext()),
            "hi sam it's pm call me at"
        );
    }

    #[test]
    fn test_clean_plaintext_is_idempotent() {
        let normalizer = Normalizer::plaintext();
        let once = clean_plaintext("Check <b>this</b> https://a.b/c out\n\nthanks", &normalizer);
        assert_eq!(clean_plaintext(&once, &normalizer), once);
    }
}
