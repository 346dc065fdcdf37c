//! Image candidate collection.
//!
//! Walks the scoped node list of a stabilized document and gathers every
//! comic page image it references: plain and lazy `src` attributes, the
//! largest `srcset` variant, CSS background images and `<noscript>`
//! fallbacks. The result is an ordered set of absolute URLs.

use crate::cancel::CancelToken;
use crate::dom::{DomQuery, ScopeRule};
use crate::Result;
use indexmap::IndexSet;
use log::debug;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Single-URL attributes read from image nodes, in priority order.
pub const SOURCE_ATTRIBUTES: [&str; 3] = ["src", "data-src", "data-lazy-src"];

/// Responsive-set attributes read from image nodes, in priority order.
pub const SRCSET_ATTRIBUTES: [&str; 2] = ["srcset", "data-srcset"];

/// A raw reference plus its declared weight.
///
/// Weights only come from `srcset` descriptors; everything else weighs 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub url: String,
    pub weight: u64,
}

impl ImageCandidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            weight: 0,
        }
    }
}

/// Ordered, duplicate-free set of resolved page image URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageImageSet {
    urls: IndexSet<Url>,
}

impl PageImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resolved URL; returns `false` when it was already present.
    pub fn insert(&mut self, url: Url) -> bool {
        self.urls.insert(url)
    }

    /// Resolve `raw` against `base` and insert it.
    ///
    /// Blank values and references that do not resolve are skipped.
    pub fn insert_raw(&mut self, base: &Url, raw: &str) -> bool {
        let raw = raw.trim();
        if raw.is_empty() {
            return false;
        }
        match base.join(raw) {
            Ok(url) => self.insert(url),
            Err(e) => {
                debug!("Skipping unresolvable image reference {:?}: {}", raw, e);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.urls.contains(url)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.urls.iter()
    }

    /// Consume the set into plain URL strings, in discovery order.
    pub fn into_strings(self) -> Vec<String> {
        self.urls.into_iter().map(String::from).collect()
    }
}

/// Parse a `srcset`-style value into weighted candidates.
///
/// Each comma-separated entry is `<url> [descriptor]`. The weight is the
/// descriptor's leading integer (`2x` → 2, `800w` → 800); missing or
/// unparseable descriptors weigh 0.
pub fn parse_srcset(value: &str) -> Vec<ImageCandidate> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let mut parts = entry.split_whitespace();
            let url = parts.next()?;
            let weight = parts.next().map(descriptor_weight).unwrap_or(0);
            Some(ImageCandidate {
                url: url.to_string(),
                weight,
            })
        })
        .collect()
}

fn descriptor_weight(descriptor: &str) -> u64 {
    let digits: String = descriptor.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Pick the highest-resolution URL out of a `srcset`-style value.
///
/// The heaviest entry wins, the first one when several share the maximum.
/// When every weight is 0 the last entry wins, since responsive lists are
/// conventionally ordered from low to high resolution.
pub fn pick_from_srcset(value: &str) -> Option<String> {
    let candidates = parse_srcset(value);
    let max = candidates.iter().map(|c| c.weight).max()?;
    let chosen = if max == 0 {
        candidates.last()
    } else {
        candidates.iter().find(|c| c.weight == max)
    };
    chosen.map(|c| c.url.clone())
}

fn css_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)]*?))\s*\)"#).expect("static regex")
    })
}

/// Extract the first `url(...)` reference of a CSS value, without quotes.
///
/// A quoted reference may contain parentheses; an unquoted one ends at the
/// first `)`.
pub fn css_url(style: &str) -> Option<String> {
    let caps = css_url_pattern().captures(style)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Raw candidates carried by one image node, in source priority order.
pub fn image_node_candidates<D: DomQuery + ?Sized>(doc: &D, node: &D::Node<'_>) -> Vec<ImageCandidate> {
    let mut out: Vec<ImageCandidate> = SOURCE_ATTRIBUTES
        .iter()
        .filter_map(|name| doc.attribute(node, name))
        .filter(|v| !v.trim().is_empty())
        .map(ImageCandidate::new)
        .collect();

    for name in SRCSET_ATTRIBUTES {
        if let Some(best) = doc.attribute(node, name).and_then(|v| pick_from_srcset(&v)) {
            out.push(ImageCandidate::new(best));
        }
    }
    out
}

/// Raw references of every `img` in a `noscript` fallback block.
///
/// Each image contributes its `src`, or its best `srcset` entry when `src`
/// is missing or blank.
pub fn noscript_candidates(markup: &str) -> Vec<String> {
    if markup.trim().is_empty() {
        return Vec::new();
    }
    let fragment = Html::parse_fragment(markup);
    let img = match Selector::parse("img") {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };
    fragment
        .select(&img)
        .filter_map(|el| {
            el.value()
                .attr("src")
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_string())
                .or_else(|| el.value().attr("srcset").and_then(pick_from_srcset))
        })
        .collect()
}

/// Collect the page images of `doc` within `rule`'s scope.
pub fn collect_page_images<D: DomQuery + ?Sized>(doc: &D, rule: &ScopeRule) -> Result<PageImageSet> {
    collect_page_images_with_cancel(doc, rule, &CancelToken::new())
}

/// Like [`collect_page_images`], aborting with `Error::Cancelled` as soon as
/// `cancel` fires. A cancelled collection never returns a partial set.
pub fn collect_page_images_with_cancel<D: DomQuery + ?Sized>(
    doc: &D,
    rule: &ScopeRule,
    cancel: &CancelToken,
) -> Result<PageImageSet> {
    let scoped = doc.query_scoped(rule)?;
    let base = doc.base_url();
    let mut images = PageImageSet::new();

    for node in &scoped.working {
        cancel.check()?;
        if doc.tag_name(node) == "img" {
            for candidate in image_node_candidates(doc, node) {
                images.insert_raw(base, &candidate.url);
            }
        }
        if let Some(style) = doc.background_image(node) {
            if let Some(raw) = css_url(&style) {
                images.insert_raw(base, &raw);
            }
        }
    }

    for node in &scoped.noscript {
        cancel.check()?;
        for raw in noscript_candidates(&doc.fragment_markup(node)) {
            images.insert_raw(base, &raw);
        }
    }

    cancel.check()?;
    debug!(
        "Collected {} image(s) from {} scoped node(s)",
        images.len(),
        scoped.working.len()
    );
    Ok(images)
}
