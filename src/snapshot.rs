//! Structured result of the in-page query step.
//!
//! A live browser cannot hand its DOM to Rust, so the scoped node list is
//! gathered in the page by `snapshot.js` and shipped back as JSON. The
//! resulting [`PageSnapshot`] answers the same [`DomQuery`] calls as a parsed
//! document, restricted to the scope it was captured for.

use crate::dom::{DomQuery, ScopeRule, ScopedNodes};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Attributes recorded for every captured node.
pub const CAPTURED_ATTRIBUTES: [&str; 5] = ["src", "data-src", "data-lazy-src", "srcset", "data-srcset"];

/// One captured element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub background_image: Option<String>,
    /// Inner markup, only recorded for `noscript` elements
    #[serde(default)]
    pub markup: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    base_url: String,
    #[serde(default)]
    nodes: Vec<NodeRecord>,
    #[serde(default)]
    noscript: Vec<NodeRecord>,
}

/// Scoped nodes of a document, frozen at capture time.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    base_url: Url,
    rule: ScopeRule,
    nodes: Vec<NodeRecord>,
    noscript: Vec<NodeRecord>,
}

impl PageSnapshot {
    /// Decode the JSON produced by the in-page script for `rule`.
    pub fn from_json(json: &str, rule: &ScopeRule) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_str(json)
            .map_err(|e| Error::RenderError(format!("Malformed page snapshot: {}", e)))?;
        let base_url = Url::parse(&raw.base_url)
            .map_err(|e| Error::RenderError(format!("Page reported invalid base URL {:?}: {}", raw.base_url, e)))?;
        Ok(Self {
            base_url,
            rule: rule.clone(),
            nodes: raw.nodes,
            noscript: raw.noscript,
        })
    }

    /// Capture the scoped nodes of any queryable document.
    pub fn capture<D: DomQuery + ?Sized>(doc: &D, rule: &ScopeRule) -> Result<Self> {
        let scoped = doc.query_scoped(rule)?;
        let nodes = scoped.working.iter().map(|n| record(doc, n, None)).collect();
        let noscript = scoped
            .noscript
            .iter()
            .map(|n| record(doc, n, Some(doc.fragment_markup(n))))
            .collect();

        Ok(Self {
            base_url: doc.base_url().clone(),
            rule: rule.clone(),
            nodes,
            noscript,
        })
    }

    pub fn rule(&self) -> &ScopeRule {
        &self.rule
    }

    /// Number of nodes in the working list
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.noscript.is_empty()
    }
}

fn record<D: DomQuery + ?Sized>(doc: &D, node: &D::Node<'_>, markup: Option<String>) -> NodeRecord {
    NodeRecord {
        tag: doc.tag_name(node),
        attributes: CAPTURED_ATTRIBUTES
            .iter()
            .filter_map(|name| doc.attribute(node, name).map(|v| (name.to_string(), v)))
            .collect(),
        background_image: doc.background_image(node),
        markup,
    }
}

impl DomQuery for PageSnapshot {
    type Node<'a> = &'a NodeRecord where Self: 'a;

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn query_scoped(&self, rule: &ScopeRule) -> Result<ScopedNodes<&NodeRecord>> {
        if rule != &self.rule {
            return Err(Error::ConfigError(format!(
                "snapshot was captured for {:?}, not {:?}",
                self.rule, rule
            )));
        }
        Ok(ScopedNodes {
            working: self.nodes.iter().collect(),
            noscript: self.noscript.iter().collect(),
        })
    }

    fn tag_name(&self, node: &&NodeRecord) -> String {
        node.tag.to_ascii_lowercase()
    }

    fn attribute(&self, node: &&NodeRecord, name: &str) -> Option<String> {
        node.attributes.get(name).cloned()
    }

    fn background_image(&self, node: &&NodeRecord) -> Option<String> {
        node.background_image
            .as_deref()
            .filter(|v| !v.trim().eq_ignore_ascii_case("none"))
            .map(|v| v.to_string())
    }

    fn fragment_markup(&self, node: &&NodeRecord) -> String {
        node.markup.clone().unwrap_or_default()
    }
}

/// Build the in-page script that captures the scoped nodes for `rule`.
#[cfg_attr(not(feature = "cdp"), allow(dead_code))]
pub(crate) fn snapshot_script(rule: &ScopeRule) -> String {
    let rule = serde_json::to_string(rule).unwrap_or_else(|_| "{}".to_string());
    let attrs = serde_json::to_string(&CAPTURED_ATTRIBUTES).unwrap_or_else(|_| "[]".to_string());
    include_str!("snapshot.js")
        .replace("__W2P_RULE__", &rule)
        .replace("__W2P_ATTRIBUTES__", &attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::StaticDocument;

    #[test]
    fn test_from_json_decodes_browser_payload() {
        let json = r#"{
            "base_url": "https://comics.example/ch-2/",
            "nodes": [
                {"tag": "div", "attributes": {}, "background_image": "none"},
                {"tag": "IMG", "attributes": {"data-src": "p1.webp"}, "background_image": null}
            ],
            "noscript": [
                {"tag": "noscript", "markup": "<img src=\"p2.webp\">"}
            ]
        }"#;
        let rule = ScopeRule::default();
        let snap = PageSnapshot::from_json(json, &rule).unwrap();
        assert_eq!(snap.len(), 2);

        let scoped = snap.query_scoped(&rule).unwrap();
        assert_eq!(snap.tag_name(&scoped.working[1]), "img");
        assert_eq!(snap.attribute(&scoped.working[1], "data-src").as_deref(), Some("p1.webp"));
        assert_eq!(snap.background_image(&scoped.working[0]), None);
        assert!(snap.fragment_markup(&scoped.noscript[0]).contains("p2.webp"));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let rule = ScopeRule::default();
        assert!(matches!(PageSnapshot::from_json("not json", &rule), Err(Error::RenderError(_))));
        assert!(matches!(
            PageSnapshot::from_json(r#"{"base_url": "relative/only"}"#, &rule),
            Err(Error::RenderError(_))
        ));
    }

    #[test]
    fn test_capture_matches_static_document() {
        let doc = StaticDocument::parse(
            r#"<div class="reading-content"><div class="page-break" style="background-image:url(bg.png)">
                <img src="1.jpg" srcset="1-small.jpg 1x, 1-big.jpg 2x" alt="one"></div></div>"#,
            "https://comics.example/",
        )
        .unwrap();
        let rule = ScopeRule::default();
        let snap = PageSnapshot::capture(&doc, &rule).unwrap();
        let scoped = snap.query_scoped(&rule).unwrap();
        assert_eq!(scoped.working.len(), 2);
        assert_eq!(scoped.working[0].background_image.as_deref(), Some("url(bg.png)"));
        assert_eq!(scoped.working[1].attributes.len(), 2);
        assert!(!scoped.working[1].attributes.contains_key("alt"));
    }

    #[test]
    fn test_snapshot_refuses_other_scope() {
        let doc = StaticDocument::parse("<p></p>", "https://comics.example/").unwrap();
        let snap = PageSnapshot::capture(&doc, &ScopeRule::default()).unwrap();
        assert_eq!(snap.rule(), &ScopeRule::default());
        let other = ScopeRule {
            page_break: ".chapter-page".to_string(),
            ..Default::default()
        };
        assert!(matches!(snap.query_scoped(&other), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_snapshot_script_embeds_selectors() {
        let script = snapshot_script(&ScopeRule {
            container: "#reader \"main\"".to_string(),
            page_break: ".page".to_string(),
        });
        assert!(script.contains(r##"const rule = {"container":"#reader \"main\"","page_break":".page"};"##));
        assert!(script.contains("data-lazy-src"));
        assert!(!script.contains("__W2P_"));
    }
}
