//! Locates the recipe-bearing part of a page before it is sent to the
//! parsing oracle. Structured markup wins over layout heuristics.

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

/// Ceiling on heuristic extractions; the oracle is billed per token.
pub const MAX_EXTRACTED_HTML_SIZE: usize = 100_000;

const CONTAINER_SELECTORS: &[&str] = &[
    ".recipe",
    ".recipe-content",
    ".recipe-container",
    "#recipe",
    "article.recipe",
    "[class*='recipe']",
    "article",
];

const ALWAYS_DROPPED: &[&str] = &["script", "style", "noscript", "iframe"];
const PAGE_CHROME: &[&str] = &["header", "footer", "nav", "aside"];
const NOISE_CLASSES: &[&str] = &["advertisement", "ads", "social-share"];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("extracted recipe HTML too large ({0} bytes)")]
    TooLarge(usize),
    #[error("page too large for recipe extraction ({0} bytes), no structured data found")]
    PageTooLarge(usize),
    #[error("no recipe content found")]
    Empty,
}

/// Where the extracted content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    JsonLd,
    Microdata,
    Container,
    FullPage,
}

impl ExtractionSource {
    /// Structured sources are exempt from the size ceiling.
    pub fn is_structured(&self) -> bool {
        matches!(self, ExtractionSource::JsonLd | ExtractionSource::Microdata)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub content: String,
    pub source: ExtractionSource,
}

#[derive(Debug, Clone)]
pub struct RecipeExtractor {
    max_size: usize,
}

impl Default for RecipeExtractor {
    fn default() -> Self {
        Self::new(MAX_EXTRACTED_HTML_SIZE)
    }
}

impl RecipeExtractor {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    pub fn extract(&self, html: &str) -> Result<Extracted, ExtractError> {
        let document = Html::parse_document(html);

        if let Some(content) = json_ld_recipes(&document) {
            return Ok(Extracted {
                content,
                source: ExtractionSource::JsonLd,
            });
        }

        if let Some(element) = first_match(&document, "[itemtype*='schema.org/Recipe']") {
            let content = render_children(element, &|el: &ElementRef<'_>| is_dropped(el, false));
            if !is_blank(&content) {
                return Ok(Extracted {
                    content,
                    source: ExtractionSource::Microdata,
                });
            }
        }

        for selector in CONTAINER_SELECTORS {
            let Some(element) = first_match(&document, selector) else {
                continue;
            };
            let content = render_children(element, &|el: &ElementRef<'_>| is_dropped(el, false));
            if is_blank(&content) {
                continue;
            }
            debug!("Recipe container matched {}", selector);
            if content.len() > self.max_size {
                return Err(ExtractError::TooLarge(content.len()));
            }
            return Ok(Extracted {
                content,
                source: ExtractionSource::Container,
            });
        }

        let content = render_children(document.root_element(), &|el: &ElementRef<'_>| is_dropped(el, true));
        if is_blank(&content) {
            return Err(ExtractError::Empty);
        }
        if content.len() > self.max_size {
            return Err(ExtractError::PageTooLarge(content.len()));
        }
        Ok(Extracted {
            content,
            source: ExtractionSource::FullPage,
        })
    }
}

/// True when the markup carries no visible text.
fn is_blank(content: &str) -> bool {
    TAG.replace_all(content, "").trim().is_empty()
}

fn first_match<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

/// Concatenated JSON-LD blocks that describe a Recipe, one per line.
fn json_ld_recipes(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    let blocks: Vec<String> = document
        .select(&selector)
        .map(|script| script.text().collect::<String>())
        .filter(|text| describes_recipe(text))
        .map(|text| text.trim().to_string())
        .collect();

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n"))
    }
}

fn describes_recipe(text: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => has_recipe_type(&value),
        // Some sites ship slightly broken JSON-LD; fall back to a text probe.
        Err(_) => text.contains(r#""@type":"Recipe""#) || text.contains(r#""@type": "Recipe""#),
    }
}

fn has_recipe_type(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let typed = match map.get("@type") {
                Some(Value::String(t)) => t == "Recipe",
                Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Recipe")),
                _ => false,
            };
            typed || map.get("@graph").is_some_and(has_recipe_type)
        }
        Value::Array(items) => items.iter().any(has_recipe_type),
        _ => false,
    }
}

fn is_dropped(element: &ElementRef<'_>, strip_chrome: bool) -> bool {
    let name = element.value().name();
    if ALWAYS_DROPPED.contains(&name) {
        return true;
    }
    strip_chrome
        && (PAGE_CHROME.contains(&name)
            || element.value().classes().any(|class| NOISE_CLASSES.contains(&class)))
}

/// Serializes the children of `element`, skipping dropped subtrees and
/// comments, with whitespace runs collapsed.
fn render_children(element: ElementRef<'_>, dropped: &dyn Fn(&ElementRef<'_>) -> bool) -> String {
    let mut out = String::new();
    write_children(element, dropped, &mut out);
    WHITESPACE.replace_all(&out, " ").trim().to_string()
}

fn write_children(element: ElementRef<'_>, dropped: &dyn Fn(&ElementRef<'_>) -> bool, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_escaped(out, text, false),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    if !dropped(&child) {
                        write_element(child, dropped, out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, dropped: &dyn Fn(&ElementRef<'_>) -> bool, out: &mut String) {
    let name = element.value().name();
    out.push('<');
    out.push_str(name);
    for (attr, value) in element.value().attrs() {
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        push_escaped(out, value, true);
        out.push('"');
    }
    out.push('>');
    if VOID_ELEMENTS.contains(&name) {
        return;
    }
    write_children(element, dropped, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn push_escaped(out: &mut String, text: &str, in_attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_json_ld_recipe() {
        let html = r#"<html><head>
            <script type="application/ld+json">{"@type":"Organization","name":"Site"}</script>
            <script type="application/ld+json">{"@context":"https://schema.org","@type":"Recipe","name":"Pad Thai"}</script>
            </head><body><div class="recipe">ignored</div></body></html>"#;

        let extracted = RecipeExtractor::default().extract(html).unwrap();
        assert_eq!(extracted.source, ExtractionSource::JsonLd);
        assert!(extracted.content.contains("Pad Thai"));
        assert!(!extracted.content.contains("Organization"));
    }

    #[test]
    fn finds_recipe_in_json_ld_graph() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@graph":[{"@type":"WebPage"},{"@type":["Recipe","NewsArticle"],"name":"Laksa"}]}
            </script></head><body></body></html>"#;
        let extracted = RecipeExtractor::default().extract(html).unwrap();
        assert_eq!(extracted.source, ExtractionSource::JsonLd);
        assert!(extracted.content.contains("Laksa"));
    }

    #[test]
    fn microdata_is_exempt_from_ceiling() {
        let steps = "<li>stir the wok</li>".repeat(200);
        let html = format!(
            r#"<html><body><div itemscope itemtype="https://schema.org/Recipe"><h2>Curry</h2><script>track()</script><ol>{}</ol></div></body></html>"#,
            steps
        );

        let extracted = RecipeExtractor::new(100).extract(&html).unwrap();
        assert_eq!(extracted.source, ExtractionSource::Microdata);
        assert!(extracted.content.starts_with("<h2>Curry</h2>"));
        assert!(!extracted.content.contains("track()"));
    }

    #[test]
    fn container_heuristic_strips_scripts() {
        let html = r#"<html><body><nav>menu</nav>
            <div class="wprm-recipe-container"><h1>Tacos</h1><style>.x{}</style><p>Warm   the
            tortillas &amp; serve</p></div></body></html>"#;

        let extracted = RecipeExtractor::default().extract(html).unwrap();
        assert_eq!(extracted.source, ExtractionSource::Container);
        assert_eq!(extracted.content, "<h1>Tacos</h1><p>Warm the tortillas &amp; serve</p>");
    }

    #[test]
    fn oversized_container_fails() {
        let html = format!(r#"<html><body><article>{}</article></body></html>"#, "x".repeat(500));
        assert_eq!(
            RecipeExtractor::new(100).extract(&html),
            Err(ExtractError::TooLarge(500))
        );
    }

    #[test]
    fn full_page_fallback_removes_chrome_and_ads() {
        let html = r#"<html><body><header>Site</header><div class="ads">Buy</div>
            <main><p>Boil noodles</p><img src="a.png"></main><footer>c</footer></body></html>"#;

        let extracted = RecipeExtractor::default().extract(html).unwrap();
        assert_eq!(extracted.source, ExtractionSource::FullPage);
        assert!(extracted.content.contains("<p>Boil noodles</p>"));
        assert!(extracted.content.contains(r#"<img src="a.png">"#));
        assert!(!extracted.content.contains("Site"));
        assert!(!extracted.content.contains("Buy"));
    }

    #[test]
    fn oversized_page_without_markup_fails() {
        let html = format!("<html><body><p>{}</p></body></html>", "y".repeat(1_000));
        assert!(matches!(
            RecipeExtractor::new(100).extract(&html),
            Err(ExtractError::PageTooLarge(_))
        ));
    }

    #[test]
    fn blank_page_is_empty() {
        assert_eq!(
            RecipeExtractor::default().extract("<html><body>  </body></html>"),
            Err(ExtractError::Empty)
        );
    }
}
