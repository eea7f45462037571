//! HTML to Markdown walker
//!
//! Walks the extracted content tree once. Inline runs between block elements
//! become paragraphs; block elements are rendered on their own and joined with
//! blank lines.

use crate::convert::links::{escape_destination, image_source, same_document, LinkResolver};
use crate::convert::toc::{Heading, Slugger};
use crate::extract::collapse_whitespace;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Elements rendered as blocks; everything else is inline
const BLOCK_ELEMENTS: &[&str] = &[
    "html", "body", "main", "article", "section", "div", "header", "footer", "aside", "nav",
    "address", "center", "hgroup", "details", "summary", "fieldset", "form", "p", "h1", "h2",
    "h3", "h4", "h5", "h6", "ul", "ol", "li", "blockquote", "pre", "hr", "table", "thead",
    "tbody", "tfoot", "tr", "figure", "figcaption", "dl", "dt", "dd",
];

/// Elements whose children make a list item "loose" (blank line separated)
const LOOSE_ITEM_CHILDREN: &[&str] = &["p", "pre", "blockquote", "table", "div", "h1", "h2", "h3", "h4", "h5", "h6"];

/// Class prefixes naming a code block's language
const LANGUAGE_PREFIXES: &[&str] = &["language-", "lang-", "highlight-source-", "highlight-"];

/// Converts one document; holds heading and asset state for the page
pub struct MarkdownWriter<'a> {
    page_url: &'a Url,
    base: &'a Url,
    resolver: &'a mut dyn LinkResolver,
    slugger: Slugger,
    headings: Vec<Heading>,
    assets: Vec<Url>,
}

impl<'a> MarkdownWriter<'a> {
    /// # Arguments
    ///
    /// * `page_url` - URL the page was served from, used to detect in-document links
    /// * `base` - Base for resolving relative references
    /// * `resolver` - Maps in-scope pages and acquired assets to output paths
    pub fn new(page_url: &'a Url, base: &'a Url, resolver: &'a mut dyn LinkResolver) -> Self {
        Self {
            page_url,
            base,
            resolver,
            slugger: Slugger::new(),
            headings: Vec::new(),
            assets: Vec::new(),
        }
    }

    /// Keeps a slug from being assigned to any heading
    pub fn reserve_slug(&mut self, slug: &str) {
        self.slugger.reserve(slug);
    }

    pub fn headings(&self) -> &[Heading] {
        &self.headings
    }

    /// Asset URLs that were rewritten to local paths, in order of first use
    pub fn into_assets(self) -> Vec<Url> {
        self.assets
    }

    /// Converts an HTML fragment to tidied Markdown
    pub fn convert(&mut self, html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let blocks = self.blocks(fragment.root_element());
        tidy(&blocks.join("\n\n"))
    }

    fn blocks(&mut self, element: ElementRef<'_>) -> Vec<String> {
        let mut out = Vec::new();
        let mut inline = String::new();

        for child in element.children() {
            match child.value() {
                Node::Text(text) => inline.push_str(&escape_text(text)),
                Node::Element(_) => {
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if BLOCK_ELEMENTS.contains(&child.value().name()) {
                        flush_paragraph(&mut inline, &mut out);
                        self.block(child, &mut out);
                    } else {
                        let rendered = self.inline_element(child);
                        inline.push_str(&rendered);
                    }
                }
                _ => {}
            }
        }

        flush_paragraph(&mut inline, &mut out);
        out
    }

    fn block(&mut self, element: ElementRef<'_>, out: &mut Vec<String>) {
        let name = element.value().name();
        match name {
            "p" => {
                let mut inline = self.inline_children(element);
                flush_paragraph(&mut inline, out);
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => self.heading(element, out),
            "ul" | "ol" => {
                let list = self.list(element, name == "ol");
                if !list.is_empty() {
                    out.push(list);
                }
            }
            "blockquote" => {
                let inner = self.blocks(element).join("\n\n");
                if !inner.is_empty() {
                    out.push(quote(&inner));
                }
            }
            "pre" => out.push(code_block(&element)),
            "hr" => out.push("---".to_string()),
            "table" => {
                let table = self.table(element);
                if !table.is_empty() {
                    out.push(table);
                }
            }
            "figcaption" => {
                let caption = self.inline_children(element);
                let caption = caption.trim();
                if !caption.is_empty() {
                    out.push(format!("*{}*", caption));
                }
            }
            "dl" => {
                let list = self.definition_list(element);
                if !list.is_empty() {
                    out.push(list);
                }
            }
            _ => out.extend(self.blocks(element)),
        }
    }

    fn heading(&mut self, element: ElementRef<'_>, out: &mut Vec<String>) {
        let level = element.value().name()[1..].parse::<usize>().unwrap_or(1);
        let text = single_line(&self.inline_children(element));
        if text.is_empty() {
            return;
        }

        let plain = collapse_whitespace(&element.text().collect::<String>());
        let slug = self.slugger.slug(&plain);
        if let Some(id) = element.value().id().filter(|id| *id != slug) {
            out.push(format!("<a id=\"{}\"></a>", id.replace('"', "&quot;")));
        }

        out.push(format!("{} {}", "#".repeat(level), text));
        self.headings.push(Heading {
            level,
            text: plain,
            slug,
        });
    }

    fn list(&mut self, element: ElementRef<'_>, ordered: bool) -> String {
        let mut number = element
            .value()
            .attr("start")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(1);
        let mut items = Vec::new();

        for item in element
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| c.value().name() == "li")
        {
            let marker = if ordered {
                let m = format!("{}. ", number);
                number += 1;
                m
            } else {
                "- ".to_string()
            };

            let loose = item
                .children()
                .filter_map(ElementRef::wrap)
                .any(|c| LOOSE_ITEM_CHILDREN.contains(&c.value().name()));
            let content = self.blocks(item).join(if loose { "\n\n" } else { "\n" });
            items.push(indent_item(&marker, &content));
        }

        items.join("\n")
    }

    fn definition_list(&mut self, element: ElementRef<'_>) -> String {
        let mut parts = Vec::new();
        for child in element.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "dt" => {
                    let term = single_line(&self.inline_children(child));
                    if !term.is_empty() {
                        parts.push(format!("**{}**", term));
                    }
                }
                "dd" => {
                    let definition = self.blocks(child).join("\n\n");
                    if !definition.is_empty() {
                        parts.push(
                            definition
                                .lines()
                                .map(|l| if l.is_empty() { String::new() } else { format!("  {}", l) })
                                .collect::<Vec<_>>()
                                .join("\n"),
                        );
                    }
                }
                _ => {}
            }
        }
        parts.join("\n")
    }

    /// Markdown table, or the original HTML when cells span rows or columns
    fn table(&mut self, element: ElementRef<'_>) -> String {
        if has_complex_structure(&element) {
            return raw_block(&element.html());
        }

        let Ok(row_selector) = Selector::parse("tr") else {
            return String::new();
        };
        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in element.select(&row_selector) {
            let cells = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "th" | "td"))
                .map(|cell| table_cell(&self.inline_children(cell)))
                .collect::<Vec<_>>();
            if !cells.is_empty() {
                rows.push(cells);
            }
        }

        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return String::new();
        }

        let mut lines = Vec::with_capacity(rows.len() + 1);
        for (i, row) in rows.iter().enumerate() {
            let mut cells = row.clone();
            cells.resize(columns, String::new());
            lines.push(format!("| {} |", cells.join(" | ")));
            if i == 0 {
                lines.push(format!("|{}", " --- |".repeat(columns)));
            }
        }
        lines.join("\n")
    }

    fn inline_children(&mut self, element: ElementRef<'_>) -> String {
        let mut out = String::new();
        for child in element.children() {
            match child.value() {
                Node::Text(text) => out.push_str(&escape_text(text)),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        let rendered = self.inline_element(child);
                        out.push_str(&rendered);
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn inline_element(&mut self, element: ElementRef<'_>) -> String {
        match element.value().name() {
            "strong" | "b" => wrap(&self.inline_children(element), "**"),
            "em" | "i" => wrap(&self.inline_children(element), "*"),
            "del" | "s" | "strike" => wrap(&self.inline_children(element), "~~"),
            "code" | "kbd" | "samp" | "tt" => code_span(&element.text().collect::<String>()),
            "a" => self.link(element),
            "img" => self.image(element),
            "br" => "\\\n".to_string(),
            "script" | "style" | "noscript" | "template" => String::new(),
            _ => self.inline_children(element),
        }
    }

    fn link(&mut self, element: ElementRef<'_>) -> String {
        let text = self.inline_children(element);
        let text = single_line(&text);
        let Some(href) = element
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty())
        else {
            return text;
        };
        if text.is_empty() {
            return String::new();
        }
        let Some(destination) = self.link_destination(href) else {
            return text;
        };

        format!(
            "[{}]({}{})",
            text,
            escape_destination(&destination),
            title_suffix(element.value().attr("title"))
        )
    }

    /// Output destination for an href
    ///
    /// - In-document anchors stay anchors
    /// - Acquired assets point at their stored copy
    /// - In-scope pages point at their output file, keeping the fragment
    /// - Everything else stays absolute
    fn link_destination(&mut self, href: &str) -> Option<String> {
        if href.starts_with('#') {
            return Some(href.to_string());
        }
        let lower = href.to_ascii_lowercase();
        if lower.starts_with("javascript:") {
            return None;
        }
        if lower.starts_with("mailto:") || lower.starts_with("tel:") {
            return Some(href.to_string());
        }

        let Ok(url) = self.base.join(href) else {
            return Some(href.to_string());
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Some(url.to_string());
        }

        if same_document(&url, self.page_url) {
            if let Some(fragment) = url.fragment() {
                return Some(format!("#{}", fragment));
            }
        }

        if let Some(path) = self.resolver.resolve_asset(&url) {
            self.note_asset(&url);
            return Some(path);
        }

        if let Some(path) = self.resolver.resolve_page(&url) {
            return Some(match url.fragment() {
                Some(fragment) => format!("{}#{}", path, fragment),
                None => path,
            });
        }

        Some(url.to_string())
    }

    fn image(&mut self, element: ElementRef<'_>) -> String {
        let Some(source) = image_source(&element, self.base) else {
            return String::new();
        };
        let alt = collapse_whitespace(element.value().attr("alt").unwrap_or_default())
            .replace('[', "\\[")
            .replace(']', "\\]");

        let destination = match self.resolver.resolve_asset(&source) {
            Some(path) => {
                self.note_asset(&source);
                path
            }
            None => source.to_string(),
        };

        format!(
            "![{}]({}{})",
            alt,
            escape_destination(&destination),
            title_suffix(element.value().attr("title"))
        )
    }

    fn note_asset(&mut self, url: &Url) {
        if !self.assets.contains(url) {
            self.assets.push(url.clone());
        }
    }
}

/// Collapses whitespace and escapes Markdown metacharacters in a text node
fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_space = false;
    for c in raw.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']' | '<') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Turns an inline run into a paragraph and appends it if non-blank
fn flush_paragraph(inline: &mut String, out: &mut Vec<String>) {
    let paragraph = inline
        .split('\n')
        .map(|line| escape_line_start(&collapse_whitespace(line)))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let paragraph = paragraph.trim_end_matches('\\').trim_end();
    if !paragraph.is_empty() {
        out.push(paragraph.to_string());
    }
    inline.clear();
}

/// Escapes text that would otherwise start a heading, quote, list or setext underline
fn escape_line_start(line: &str) -> String {
    if line.starts_with(['#', '>', '-', '+', '=']) {
        return format!("\\{}", line);
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(after) = rest.strip_prefix(['.', ')']) {
            if after.is_empty() || after.starts_with(' ') {
                return format!("{}\\{}", &line[..digits], rest);
            }
        }
    }
    line.to_string()
}

fn single_line(text: &str) -> String {
    collapse_whitespace(&text.replace("\\\n", " "))
}

fn wrap(inner: &str, delimiter: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return inner.to_string();
    }
    let lead = if inner.starts_with(' ') { " " } else { "" };
    let trail = if inner.ends_with(' ') { " " } else { "" };
    format!("{}{}{}{}{}", lead, delimiter, trimmed, delimiter, trail)
}

fn code_span(raw: &str) -> String {
    let text = collapse_whitespace(raw);
    if text.is_empty() {
        return String::new();
    }
    let ticks = "`".repeat(longest_backtick_run(&text) + 1);
    if text.starts_with('`') || text.ends_with('`') {
        format!("{} {} {}", ticks, text, ticks)
    } else {
        format!("{}{}{}", ticks, text, ticks)
    }
}

fn longest_backtick_run(text: &str) -> usize {
    text.split(|c| c != '`').map(str::len).max().unwrap_or(0)
}

fn title_suffix(title: Option<&str>) -> String {
    title
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty())
        .map(|t| format!(" \"{}\"", t.replace('"', "\\\"")))
        .unwrap_or_default()
}

fn quote(inner: &str) -> String {
    inner
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefixes the first line with the marker and indents the rest to match
fn indent_item(marker: &str, content: &str) -> String {
    if content.is_empty() {
        return marker.trim_end().to_string();
    }
    let indent = " ".repeat(marker.len());
    content
        .lines()
        .enumerate()
        .map(|(i, line)| match (i, line.is_empty()) {
            (0, _) => format!("{}{}", marker, line),
            (_, true) => String::new(),
            _ => format!("{}{}", indent, line),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn code_block(pre: &ElementRef<'_>) -> String {
    let mut code: String = pre.text().collect();
    if code.starts_with('\n') {
        code.remove(0);
    }
    let code = code.trim_end_matches('\n');
    let fence = "`".repeat((longest_backtick_run(code) + 1).max(3));
    let language = code_language(pre).unwrap_or_default();
    format!("{}{}\n{}\n{}", fence, language, code, fence)
}

/// Language hint from the `pre` element, its first `code` child, or its wrapper
///
/// Highlighters such as Pygments put `highlight-source-*` on the enclosing `div`.
pub fn code_language(pre: &ElementRef<'_>) -> Option<String> {
    let code = pre
        .children()
        .filter_map(ElementRef::wrap)
        .find(|c| c.value().name() == "code");
    let wrapper = pre.parent().and_then(ElementRef::wrap);

    [Some(*pre), code, wrapper].into_iter().flatten().find_map(|el| {
        let value = el.value();
        value
            .attr("data-lang")
            .or_else(|| value.attr("data-language"))
            .map(str::to_string)
            .or_else(|| {
                value.classes().find_map(|class| {
                    LANGUAGE_PREFIXES
                        .iter()
                        .find_map(|prefix| class.strip_prefix(prefix))
                        .map(str::to_string)
                })
            })
            .map(|lang| lang.trim().to_lowercase())
            .filter(|lang| !lang.is_empty() && !lang.contains(char::is_whitespace))
    })
}

/// True if any cell spans rows or columns, or the table nests another table
fn has_complex_structure(table: &ElementRef<'_>) -> bool {
    let spans = Selector::parse("td, th")
        .map(|cells| {
            table.select(&cells).any(|cell| {
                ["rowspan", "colspan"].iter().any(|attr| {
                    cell.value()
                        .attr(attr)
                        .and_then(|v| v.trim().parse::<u32>().ok())
                        .map_or(false, |n| n > 1)
                })
            })
        })
        .unwrap_or(false);
    let nested = Selector::parse("table")
        .map(|inner| table.select(&inner).next().is_some())
        .unwrap_or(false);
    spans || nested
}

/// Embeds HTML verbatim; blank lines would end the HTML block early
fn raw_block(html: &str) -> String {
    html.lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn table_cell(content: &str) -> String {
    single_line(content).replace('|', "\\|")
}

/// Trims trailing whitespace and collapses blank line runs outside code fences
pub fn tidy(markdown: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut fence: Option<String> = None;
    let mut blank_run = 0;

    for line in markdown.lines() {
        let start = line.trim_start();

        if let Some(open) = &fence {
            if start.starts_with(open.as_str()) && start.trim_end().chars().all(|c| c == '`') {
                fence = None;
            }
            out.push(line);
            continue;
        }

        let ticks = start.chars().take_while(|c| *c == '`').count();
        if ticks >= 3 {
            fence = Some("`".repeat(ticks));
        }

        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }

    while out.last().map_or(false, |l| l.is_empty()) {
        out.pop();
    }
    let start = out.iter().take_while(|l| l.is_empty()).count();
    let mut result = out[start..].join("\n");
    if !result.is_empty() {
        result.push('\n');
    }
    result
}
