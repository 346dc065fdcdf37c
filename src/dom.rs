//! Read-only DOM query capability used by the image collector.
//!
//! The collector never talks to a browser directly. It asks a [`DomQuery`]
//! implementation for the scoped node list and reads attributes and computed
//! styles through it, which keeps extraction a pure function that can be
//! exercised against documents built from literal HTML.
//!
//! Two implementations ship with the crate:
//!
//! - [`StaticDocument`]: HTML parsed with `scraper`. Computed background
//!   images are approximated from each element's inline `style` attribute.
//! - [`crate::snapshot::PageSnapshot`]: the structured result of the in-page
//!   query step run by a live browser.

use crate::{Error, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

/// Selectors bounding which part of a page counts as comic content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeRule {
    /// Reading content container. Only its first match is used; when nothing
    /// matches the whole document is the scope.
    pub container: String,
    /// Page break marker. Matching nodes and all their descendants form the
    /// working node list.
    pub page_break: String,
}

impl Default for ScopeRule {
    fn default() -> Self {
        Self {
            container: ".reading-content".to_string(),
            page_break: ".page-break".to_string(),
        }
    }
}

impl ScopeRule {
    /// Check that both selectors parse.
    pub fn validate(&self) -> Result<()> {
        parse_selector(&self.container)?;
        parse_selector(&self.page_break)?;
        Ok(())
    }
}

/// Nodes selected by a [`ScopeRule`], in document order.
#[derive(Debug, Clone)]
pub struct ScopedNodes<N> {
    /// Page break nodes and their descendants, each at most once.
    pub working: Vec<N>,
    /// `noscript` elements anywhere inside the scope.
    pub noscript: Vec<N>,
}

/// Read-only access to a rendered document's tree.
pub trait DomQuery {
    /// Handle to one element of the document
    type Node<'a>
    where
        Self: 'a;

    /// Base URL relative references resolve against
    fn base_url(&self) -> &Url;

    /// Run the scope rule and return the working and `noscript` node lists.
    fn query_scoped(&self, rule: &ScopeRule) -> Result<ScopedNodes<Self::Node<'_>>>;

    /// Lowercase tag name of `node`
    fn tag_name(&self, node: &Self::Node<'_>) -> String;

    /// Raw attribute value, `None` when the attribute is absent
    fn attribute(&self, node: &Self::Node<'_>, name: &str) -> Option<String>;

    /// Computed `background-image` value, `None` when it is `none`
    fn background_image(&self, node: &Self::Node<'_>) -> Option<String>;

    /// Markup held by a `noscript` element, ready for fragment parsing
    fn fragment_markup(&self, node: &Self::Node<'_>) -> String;
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| Error::ConfigError(format!("invalid selector {:?}: {:?}", selector, e)))
}

/// An HTML document parsed without a browser.
pub struct StaticDocument {
    html: Html,
    base_url: Url,
}

impl StaticDocument {
    /// Parse `html` and resolve references against `base_url`.
    pub fn parse(html: &str, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        Ok(Self::from_html(html, base_url))
    }

    pub fn from_html(html: &str, base_url: Url) -> Self {
        Self {
            html: Html::parse_document(html),
            base_url,
        }
    }

    // Elements strictly inside the scope, in document order.
    fn scope_elements(&self, container: &Selector) -> Vec<ElementRef<'_>> {
        match self.html.select(container).next() {
            Some(scope) => scope.descendants().skip(1).filter_map(ElementRef::wrap).collect(),
            None => self
                .html
                .tree
                .root()
                .descendants()
                .filter_map(ElementRef::wrap)
                .collect(),
        }
    }
}

impl DomQuery for StaticDocument {
    type Node<'a> = ElementRef<'a> where Self: 'a;

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn query_scoped(&self, rule: &ScopeRule) -> Result<ScopedNodes<ElementRef<'_>>> {
        let container = parse_selector(&rule.container)?;
        let page_break = parse_selector(&rule.page_break)?;

        let elements = self.scope_elements(&container);

        let working = elements
            .iter()
            .copied()
            .filter(|el| {
                page_break.matches(el)
                    || el
                        .ancestors()
                        .filter_map(ElementRef::wrap)
                        .any(|a| page_break.matches(&a))
            })
            .collect();

        let noscript = elements
            .iter()
            .copied()
            .filter(|el| el.value().name().eq_ignore_ascii_case("noscript"))
            .collect();

        Ok(ScopedNodes { working, noscript })
    }

    fn tag_name(&self, node: &ElementRef<'_>) -> String {
        node.value().name().to_ascii_lowercase()
    }

    fn attribute(&self, node: &ElementRef<'_>, name: &str) -> Option<String> {
        node.value().attr(name).map(|v| v.to_string())
    }

    fn background_image(&self, node: &ElementRef<'_>) -> Option<String> {
        node.value().attr("style").and_then(inline_background_image)
    }

    fn fragment_markup(&self, node: &ElementRef<'_>) -> String {
        // With scripting enabled the parser keeps noscript content as raw text.
        let text: String = node.text().collect();
        if text.trim().is_empty() {
            node.inner_html()
        } else {
            text
        }
    }
}

/// Effective `background-image` of an inline style declaration block.
///
/// Later declarations override earlier ones, and a `background` shorthand
/// without an image resets it, as the cascade would.
fn inline_background_image(style: &str) -> Option<String> {
    let mut found = None;
    for decl in split_declarations(style) {
        let Some((prop, value)) = decl.split_once(':') else {
            continue;
        };
        let prop = prop.trim().to_ascii_lowercase();
        if prop == "background-image" || prop == "background" {
            let value = value.trim();
            found = if value.to_ascii_lowercase().contains("url(") {
                Some(value.to_string())
            } else {
                None
            };
        }
    }
    found
}

// Split on `;` outside parentheses and quotes, so data URLs survive.
fn split_declarations(style: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in style.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ';' if depth == 0 => {
                    out.push(&style[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    out.push(&style[start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://comics.example/series/ch-1/";

    fn tags(doc: &StaticDocument, nodes: &[ElementRef<'_>]) -> Vec<String> {
        nodes.iter().map(|n| doc.tag_name(n)).collect()
    }

    #[test]
    fn test_working_list_includes_descendants_in_order() {
        let doc = StaticDocument::parse(
            r#"<html><body>
                <img id="logo" src="/logo.png">
                <div class="reading-content">
                    <div class="page-break"><a><img src="1.jpg"></a></div>
                    <p>chatter</p>
                    <div class="page-break"><img src="2.jpg"></div>
                </div>
            </body></html>"#,
            BASE,
        )
        .unwrap();

        let scoped = doc.query_scoped(&ScopeRule::default()).unwrap();
        assert_eq!(tags(&doc, &scoped.working), vec!["div", "a", "img", "div", "img"]);
        assert!(scoped.noscript.is_empty());
    }

    #[test]
    fn test_nested_page_breaks_listed_once() {
        let doc = StaticDocument::parse(
            r#"<div class="page-break"><div class="page-break"><img src="a.jpg"></div></div>"#,
            BASE,
        )
        .unwrap();
        let scoped = doc.query_scoped(&ScopeRule::default()).unwrap();
        assert_eq!(scoped.working.len(), 3);
    }

    #[test]
    fn test_missing_container_falls_back_to_document() {
        let doc = StaticDocument::parse(
            r#"<body><div class="page-break"><img src="a.jpg"></div><noscript><img src="b.jpg"></noscript></body>"#,
            BASE,
        )
        .unwrap();
        let scoped = doc.query_scoped(&ScopeRule::default()).unwrap();
        assert_eq!(tags(&doc, &scoped.working), vec!["div", "img"]);
        assert_eq!(scoped.noscript.len(), 1);
        assert!(doc.fragment_markup(&scoped.noscript[0]).contains("b.jpg"));
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let doc = StaticDocument::parse("<p></p>", BASE).unwrap();
        let rule = ScopeRule {
            container: "div[".to_string(),
            ..Default::default()
        };
        assert!(matches!(doc.query_scoped(&rule), Err(Error::ConfigError(_))));
        assert!(rule.validate().is_err());
        assert!(ScopeRule::default().validate().is_ok());
    }

    #[test]
    fn test_inline_background_image() {
        assert_eq!(
            inline_background_image("color: red; background-image: url('x.png')").as_deref(),
            Some("url('x.png')")
        );
        assert_eq!(
            inline_background_image("background: #000 url(data:image/png;base64,AAA=) no-repeat")
                .as_deref(),
            Some("#000 url(data:image/png;base64,AAA=) no-repeat")
        );
        assert_eq!(inline_background_image("background-image: url(a.png); background: red"), None);
        assert_eq!(inline_background_image("background-image: none"), None);
        assert_eq!(inline_background_image(""), None);
    }
}
