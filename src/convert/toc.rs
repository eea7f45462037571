//! Heading slugs and the table of contents

use std::collections::HashSet;

/// Slug of the generated table of contents heading
pub const TOC_SLUG: &str = "table-of-contents";

/// A heading seen during conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub text: String,
    pub slug: String,
}

/// Generates unique GitHub-style heading slugs
///
/// Duplicates get `-1`, `-2`, ... suffixes in order of appearance, matching
/// how most Markdown renderers assign heading anchors.
#[derive(Debug, Default)]
pub struct Slugger {
    used: HashSet<String>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a slug as taken without emitting it
    pub fn reserve(&mut self, slug: &str) {
        self.used.insert(slug.to_string());
    }

    /// Returns the next unique slug for a heading text
    pub fn slug(&mut self, text: &str) -> String {
        let base = slugify(text);
        if self.used.insert(base.clone()) {
            return base;
        }

        let mut n = 1;
        loop {
            let candidate = format!("{}-{}", base, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Lowercases, drops punctuation and turns spaces into hyphens
pub fn slugify(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            '-' | '_' => Some(c),
            c if c.is_alphanumeric() => Some(c),
            _ => None,
        })
        .collect()
}

/// Renders a nested bullet list of links to the headings
///
/// Returns None when there are fewer than two headings; a single heading does
/// not need a table of contents.
pub fn render_toc(headings: &[Heading]) -> Option<String> {
    if headings.len() < 2 {
        return None;
    }

    let min_level = headings.iter().map(|h| h.level).min().unwrap_or(1);
    let mut toc = String::from("## Table of Contents\n\n");
    for heading in headings {
        let indent = "  ".repeat(heading.level - min_level);
        let text = heading.text.replace('[', "\\[").replace(']', "\\]");
        toc.push_str(&format!("{}- [{}](#{})\n", indent, text, heading.slug));
    }
    Some(toc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Getting Started"), "getting-started");
        assert_eq!(slugify("What's new in v2.0?"), "whats-new-in-v20");
        assert_eq!(slugify("snake_case and-dash"), "snake_case-and-dash");
        assert_eq!(slugify("Über Uns"), "über-uns");
    }

    #[test]
    fn test_duplicate_suffixes() {
        let mut slugger = Slugger::new();
        assert_eq!(slugger.slug("Usage"), "usage");
        assert_eq!(slugger.slug("Usage"), "usage-1");
        assert_eq!(slugger.slug("Usage"), "usage-2");
        assert_eq!(slugger.slug("Usage 1"), "usage-1-1");
    }

    #[test]
    fn test_reserved_slug() {
        let mut slugger = Slugger::new();
        slugger.reserve(TOC_SLUG);
        assert_eq!(slugger.slug("Table of Contents"), "table-of-contents-1");
    }

    #[test]
    fn test_render_toc_nesting() {
        let headings = vec![
            Heading { level: 2, text: "Install".into(), slug: "install".into() },
            Heading { level: 3, text: "From [source]".into(), slug: "from-source".into() },
            Heading { level: 2, text: "Usage".into(), slug: "usage".into() },
        ];
        let toc = render_toc(&headings).unwrap();
        assert_eq!(
            toc,
            "## Table of Contents\n\n- [Install](#install)\n  - [From \\[source\\]](#from-source)\n- [Usage](#usage)\n"
        );
    }

    #[test]
    fn test_single_heading_has_no_toc() {
        let headings = vec![Heading { level: 1, text: "Only".into(), slug: "only".into() }];
        assert!(render_toc(&headings).is_none());
    }
}
