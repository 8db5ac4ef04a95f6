//! Public channel preview pages
//!
//! Channels are fetched through their web preview (`t.me/s/<name>`), and each
//! message body becomes one text fragment.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

const PREVIEW_BASE: &str = "https://t.me/s/";

static MESSAGE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.tgme_widget_message_text").unwrap());

/// Canonical preview URL for a channel name or URL.
///
/// Accepts `name`, `@name`, `https://t.me/name` and `https://t.me/s/name`.
pub fn preview_url(channel: &str) -> String {
    let channel = channel.trim();

    if channel.starts_with("http") {
        if !channel.contains("t.me/s/") && channel.contains("t.me/") {
            return channel.replacen("t.me/", "t.me/s/", 1);
        }
        return channel.to_string();
    }

    format!("{}{}", PREVIEW_BASE, channel.trim_start_matches('@'))
}

/// Extract the text of every message block on a preview page
pub fn extract_messages(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    document
        .select(&MESSAGE_SELECTOR)
        .map(|message| message_text(&message))
        .collect()
}

/// Text nodes of a message joined by newlines, so `<br>`-separated links
/// never run together
fn message_text(message: &ElementRef<'_>) -> String {
    let mut parts = Vec::new();

    for node_ref in message.descendants() {
        if let Node::Text(text_node) = node_ref.value() {
            let text: &str = text_node;
            if !text.is_empty() {
                parts.push(text.to_string());
            }
        }
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_url() {
        assert_eq!(preview_url("freeconfigs"), "https://t.me/s/freeconfigs");
        assert_eq!(preview_url("@freeconfigs"), "https://t.me/s/freeconfigs");
        assert_eq!(preview_url("https://t.me/freeconfigs"), "https://t.me/s/freeconfigs");
        assert_eq!(preview_url("https://t.me/s/freeconfigs"), "https://t.me/s/freeconfigs");
        assert_eq!(preview_url("http://127.0.0.1:8080/page"), "http://127.0.0.1:8080/page");
    }

    #[test]
    fn test_extract_messages() {
        let html = r#"
            <html>
            <body>
                <div class="tgme_widget_message_wrap">
                    <div class="tgme_widget_message_text js-message_text">First<br>vless://id@1.2.3.4:443?sni=a.com</div>
                </div>
                <div class="tgme_widget_message_wrap">
                    <div class="tgme_widget_message_text"><b>Second</b> trojan://pw@5.6.7.8:443</div>
                </div>
                <div class="tgme_widget_message_footer">not a message</div>
            </body>
            </html>
        "#;

        let messages = extract_messages(html);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], "First\nvless://id@1.2.3.4:443?sni=a.com");
        assert!(messages[1].contains("trojan://pw@5.6.7.8:443"));
        assert!(!messages.iter().any(|m| m.contains("not a message")));
    }

    #[test]
    fn test_no_messages() {
        assert!(extract_messages("<html><body><p>empty channel</p></body></html>").is_empty());
    }
}
