//! Main-content strategies
//!
//! A closed set tried in a fixed order. Each strategy either returns a content
//! root with enough text or declines, and the next one gets its turn.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::fmt;

/// Containers that usually hold the main content, most specific first
const SEMANTIC_SELECTORS: &[&str] = &[
    "main",
    "[role=main]",
    "article",
    "#content",
    "#main-content",
    ".main-content",
    ".markdown-body",
    ".post-content",
    ".entry-content",
    ".article-body",
    ".docs-content",
    ".content",
];

/// Paragraph-like blocks that vote for their ancestors in density scoring
const SCORED_BLOCKS: &str = "p, pre, li, td, blockquote, dd";

/// Blocks shorter than this do not vote
const MIN_VOTING_TEXT: usize = 25;

/// Extraction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Semantic containers: `main`, `article`, `role=main`, known content classes
    Semantic,
    /// Text-density scoring of block containers
    Density,
    /// The cleaned body as a whole
    Body,
}

impl Strategy {
    /// Strategies in the order they are tried
    pub const ORDER: [Strategy; 3] = [Strategy::Semantic, Strategy::Density, Strategy::Body];

    /// Picks the content root, or None if this strategy finds nothing usable
    ///
    /// # Arguments
    ///
    /// * `document` - Document with boilerplate already removed
    /// * `min_text_chars` - Text below which a result counts as near-empty
    pub fn select<'a>(&self, document: &'a Html, min_text_chars: usize) -> Option<ElementRef<'a>> {
        match self {
            Self::Semantic => semantic(document, min_text_chars),
            Self::Density => density(document, min_text_chars),
            Self::Body => body(document),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Density => "density",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn semantic(document: &Html, min_text_chars: usize) -> Option<ElementRef<'_>> {
    for raw in SEMANTIC_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let best = document
            .select(&selector)
            .map(|el| (text_len(&el), el))
            .max_by_key(|(len, _)| *len);
        if let Some((len, el)) = best {
            if len >= min_text_chars {
                return Some(el);
            }
        }
    }
    None
}

fn density(document: &Html, min_text_chars: usize) -> Option<ElementRef<'_>> {
    let selector = Selector::parse(SCORED_BLOCKS).ok()?;
    // Candidates in order of first vote, so ties go to the earliest container
    let mut scores: Vec<(ElementRef<'_>, f64)> = Vec::new();
    let mut slots: HashMap<_, usize> = HashMap::new();

    for block in document.select(&selector) {
        let len = text_len(&block);
        if len < MIN_VOTING_TEXT {
            continue;
        }
        let mut weight = 1.0;
        for ancestor in block.ancestors().take(2).filter_map(ElementRef::wrap) {
            if matches!(ancestor.value().name(), "html" | "body") {
                break;
            }
            let slot = *slots.entry(ancestor.id()).or_insert_with(|| {
                scores.push((ancestor, 0.0));
                scores.len() - 1
            });
            scores[slot].1 += len as f64 * weight;
            weight /= 2.0;
        }
    }

    let mut best: Option<(f64, ElementRef<'_>)> = None;
    for (el, score) in scores {
        if text_len(&el) < min_text_chars {
            continue;
        }
        let score = score * (1.0 - link_density(&el));
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, el));
        }
    }
    best.map(|(_, el)| el)
}

fn body(document: &Html) -> Option<ElementRef<'_>> {
    let selector = Selector::parse("body").ok()?;
    let body = document.select(&selector).next()?;
    let has_images = Selector::parse("img")
        .map(|img| body.select(&img).next().is_some())
        .unwrap_or(false);
    (text_len(&body) > 0 || has_images).then_some(body)
}

/// Non-whitespace characters of text under an element
pub fn text_len(element: &ElementRef<'_>) -> usize {
    element
        .text()
        .map(|t| t.split_whitespace().map(str::len).sum::<usize>())
        .sum()
}

/// Share of an element's text that sits inside links
fn link_density(element: &ElementRef<'_>) -> f64 {
    let total = text_len(element);
    if total == 0 {
        return 1.0;
    }
    let linked: usize = Selector::parse("a")
        .map(|a| element.select(&a).map(|link| text_len(&link)).sum())
        .unwrap_or(0);
    linked as f64 / total as f64
}
