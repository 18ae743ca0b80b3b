// src/utils/html.rs
use scraper::{node::Node, Html};

/// Flattens an HTML fragment or document to plain text.
/// Script and style bodies are dropped; runs of whitespace collapse to one space.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let document = Html::parse_document(html);

    let mut text = String::with_capacity(html.len() / 2);
    for node in document.root_element().descendants() {
        if let Node::Text(text_node) = node.value() {
            let in_script = node
                .parent()
                .and_then(|parent| parent.value().as_element())
                .map(|el| matches!(el.name(), "script" | "style"))
                .unwrap_or(false);
            if in_script {
                continue;
            }
            text.push_str(&text_node.text);
            text.push(' ');
        }
    }

    collapse_whitespace(&text)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
