//! Two-level tokenizer for the `<tbody>` of a form table page.
//!
//! The body is split into rows, each row into cells. Everything between
//! those boundaries must be whitespace or HTML comments; anything else is a
//! [`ParseError`] rather than a guess. Every byte of the region is kept so
//! that [`TableBlock::serialize`] reproduces untouched rows exactly.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::language::Language;

static TBODY_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<tbody\b[^>]*>").expect("valid pattern"));
static TBODY_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</tbody\s*>").expect("valid pattern"));
static ROW_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<tr\b[^>]*>").expect("valid pattern"));
static ROW_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</tr\s*>").expect("valid pattern"));
static CELL_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<t[dh]\b[^>]*>").expect("valid pattern"));
static CELL_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</t[dh]\s*>").expect("valid pattern"));
static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\shref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid pattern")
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid pattern"));
// An unterminated comment runs to the end of the text.
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?(?:-->|\z)").expect("valid pattern"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no <tbody> region found")]
    MissingTableBody,
    #[error("<tbody> opened at byte {0} is never closed")]
    UnclosedTableBody(usize),
    #[error("row opened at byte {0} is never closed")]
    UnclosedRow(usize),
    #[error("cell opened at byte {0} is never closed")]
    UnclosedCell(usize),
    #[error("unexpected content between rows at byte {0}")]
    StrayBodyContent(usize),
    #[error("unexpected content between cells at byte {0}")]
    StrayRowContent(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    column: usize,
    open_tag: String,
    inner: String,
    close_tag: String,
    href: Option<Range<usize>>,
}

impl Cell {
    fn new(column: usize, open_tag: &str, inner: &str, close_tag: &str) -> Self {
        Self {
            column,
            open_tag: open_tag.to_owned(),
            inner: inner.to_owned(),
            close_tag: close_tag.to_owned(),
            href: find_href(inner),
        }
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn inner(&self) -> &str {
        &self.inner
    }

    pub fn has_link(&self) -> bool {
        self.href.is_some()
    }

    /// Trimmed target of the first anchor with a non-blank `href`.
    pub fn href(&self) -> Option<&str> {
        self.href.clone().map(|span| &self.inner[span])
    }

    /// Text content with markup stripped and whitespace trimmed.
    pub fn text(&self) -> String {
        let stripped = TAG.replace_all(&self.inner, "");
        stripped
            .replace("&nbsp;", " ")
            .replace("&#160;", " ")
            .replace("&#xa0;", " ")
            .replace("&#xA0;", " ")
            .replace('\u{a0}', " ")
            .trim()
            .to_owned()
    }

    /// Rewrites only the `href` value, leaving the rest of the markup intact.
    /// Returns the previous target.
    pub fn replace_href(&mut self, new_href: &str) -> Option<String> {
        let span = self.href.clone()?;
        let old = self.inner[span.clone()].to_owned();
        self.inner.replace_range(span.clone(), new_href);
        self.href = Some(span.start..span.start + new_href.len());
        Some(old)
    }

    /// Replaces the whole inner markup with the language placeholder.
    /// Returns the removed target, if the cell had one.
    pub fn blank(&mut self, language: Language) -> Option<String> {
        let removed = self.href().map(str::to_owned);
        self.inner = language.placeholder().to_owned();
        self.href = None;
        removed
    }

    fn write_to(&self, out: &mut String) {
        out.push_str(&self.open_tag);
        out.push_str(&self.inner);
        out.push_str(&self.close_tag);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    open_tag: String,
    close_tag: String,
    // `fillers.len() == cells.len() + 1`; filler `i` precedes cell `i`.
    fillers: Vec<String>,
    cells: Vec<Cell>,
}

impl Row {
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn cell_mut(&mut self, column: usize) -> Option<&mut Cell> {
        self.cells.get_mut(column)
    }

    /// Year key taken from the first cell. `None` unless it is all digits.
    pub fn year(&self) -> Option<String> {
        let text = self.cells.first()?.text();
        if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
            Some(text)
        } else {
            None
        }
    }

    /// Raw first-cell text, used in diagnostics when [`Row::year`] is `None`.
    pub fn label(&self) -> String {
        self.cells.first().map(Cell::text).unwrap_or_default()
    }

    fn write_to(&self, out: &mut String) {
        out.push_str(&self.open_tag);
        for (filler, cell) in self.fillers.iter().zip(&self.cells) {
            out.push_str(filler);
            cell.write_to(out);
        }
        if let Some(last) = self.fillers.last() {
            out.push_str(last);
        }
        out.push_str(&self.close_tag);
    }
}

/// The first `<tbody>` region of a document, fully tokenized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    span: Range<usize>,
    open_tag: String,
    close_tag: String,
    fillers: Vec<String>,
    rows: Vec<Row>,
    min_cells: usize,
}

impl TableBlock {
    pub fn parse(document: &str, min_cells: usize) -> Result<Self, ParseError> {
        let comments = comment_spans(document);
        let open = find_open(document, 0, &TBODY_OPEN, &comments)
            .ok_or(ParseError::MissingTableBody)?;
        let close = balanced_close(document, open.end(), &TBODY_OPEN, &TBODY_CLOSE, &comments)
            .ok_or(ParseError::UnclosedTableBody(open.start()))?;

        let body = &document[open.end()..close.start];
        let (fillers, rows) = split_rows(body, open.end())?;

        Ok(Self {
            span: open.start()..close.end,
            open_tag: open.as_str().to_owned(),
            close_tag: document[close].to_owned(),
            fillers,
            rows,
            min_cells,
        })
    }

    /// Byte span of the region in the source document.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// Rows with at least the minimum cell count.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        let min = self.min_cells;
        self.rows.iter().filter(move |row| row.cells.len() >= min)
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut Row> {
        let min = self.min_cells;
        self.rows.iter_mut().filter(move |row| row.cells.len() >= min)
    }

    /// Number of rows ignored for being under-sized.
    pub fn skipped_rows(&self) -> usize {
        self.rows.len() - self.rows().count()
    }

    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.span.len());
        out.push_str(&self.open_tag);
        for (filler, row) in self.fillers.iter().zip(&self.rows) {
            out.push_str(filler);
            row.write_to(&mut out);
        }
        if let Some(last) = self.fillers.last() {
            out.push_str(last);
        }
        out.push_str(&self.close_tag);
        out
    }

    /// Replaces the original region of `document` with the serialized block.
    pub fn splice_into(&self, document: &str) -> String {
        let serialized = self.serialize();
        let mut out =
            String::with_capacity(document.len() - self.span.len() + serialized.len());
        out.push_str(&document[..self.span.start]);
        out.push_str(&serialized);
        out.push_str(&document[self.span.end..]);
        out
    }
}

fn split_rows(body: &str, base: usize) -> Result<(Vec<String>, Vec<Row>), ParseError> {
    let mut fillers = Vec::new();
    let mut rows = Vec::new();
    let mut cursor = 0usize;
    let comments = comment_spans(body);

    while let Some(open) = find_open(body, cursor, &ROW_OPEN, &comments) {
        let gap = &body[cursor..open.start()];
        if !is_filler(gap) {
            return Err(ParseError::StrayBodyContent(base + cursor));
        }
        fillers.push(gap.to_owned());

        let close = confirmed_close(body, open.end(), &ROW_OPEN, &ROW_CLOSE)
            .ok_or(ParseError::UnclosedRow(base + open.start()))?;

        let content = &body[open.end()..close.start];
        let (cell_fillers, cells) = split_cells(content, base + open.end())?;
        rows.push(Row {
            open_tag: open.as_str().to_owned(),
            close_tag: body[close.clone()].to_owned(),
            fillers: cell_fillers,
            cells,
        });
        cursor = close.end;
    }

    let tail = &body[cursor..];
    if !is_filler(tail) {
        return Err(ParseError::StrayBodyContent(base + cursor));
    }
    fillers.push(tail.to_owned());

    Ok((fillers, rows))
}

fn split_cells(content: &str, base: usize) -> Result<(Vec<String>, Vec<Cell>), ParseError> {
    let mut fillers = Vec::new();
    let mut cells = Vec::new();
    let mut cursor = 0usize;
    let comments = comment_spans(content);

    while let Some(open) = find_open(content, cursor, &CELL_OPEN, &comments) {
        let gap = &content[cursor..open.start()];
        if !is_filler(gap) {
            return Err(ParseError::StrayRowContent(base + cursor));
        }
        fillers.push(gap.to_owned());

        let close = confirmed_close(content, open.end(), &CELL_OPEN, &CELL_CLOSE)
            .ok_or(ParseError::UnclosedCell(base + open.start()))?;
        cells.push(Cell::new(
            cells.len(),
            open.as_str(),
            &content[open.end()..close.start],
            &content[close.clone()],
        ));
        cursor = close.end;
    }

    let tail = &content[cursor..];
    if !is_filler(tail) {
        return Err(ParseError::StrayRowContent(base + cursor));
    }
    fillers.push(tail.to_owned());

    Ok((fillers, cells))
}

/// Finds the close tag matching an element whose content starts at `from`.
///
/// A candidate is accepted only when the enclosed markup has balanced
/// open/close tags of the same kind and what follows it is either another
/// sibling of that kind or the end of the parent.
fn confirmed_close(
    content: &str,
    from: usize,
    open: &Regex,
    close: &Regex,
) -> Option<Range<usize>> {
    for candidate in close.find_iter(&content[from..]) {
        let inner = &content[from..from + candidate.start()];
        if !is_nested_balanced(inner, open, close) {
            continue;
        }

        let end = from + candidate.end();
        let Some(rest) = skip_filler(&content[end..]) else {
            continue;
        };
        let at_boundary =
            rest.is_empty() || open.find(rest).is_some_and(|next| next.start() == 0);
        if at_boundary {
            return Some(from + candidate.start()..end);
        }
    }
    None
}

/// Like [`confirmed_close`] but without the sibling check, for the outermost
/// region where anything may follow.
fn balanced_close(
    text: &str,
    from: usize,
    open: &Regex,
    close: &Regex,
    comments: &[Range<usize>],
) -> Option<Range<usize>> {
    close
        .find_iter(&text[from..])
        .map(|candidate| from + candidate.start()..from + candidate.end())
        .filter(|candidate| !in_comment(comments, candidate.start))
        .find(|candidate| is_nested_balanced(&text[from..candidate.start], open, close))
}

/// Next match of `open` at or after `from` that is not inside a comment.
fn find_open<'t>(
    text: &'t str,
    from: usize,
    open: &Regex,
    comments: &[Range<usize>],
) -> Option<regex::Match<'t>> {
    let mut cursor = from;
    loop {
        let found = open.find_at(text, cursor)?;
        match comments.iter().find(|span| span.contains(&found.start())) {
            Some(span) => cursor = span.end,
            None => return Some(found),
        }
    }
}

fn comment_spans(text: &str) -> Vec<Range<usize>> {
    COMMENT.find_iter(text).map(|m| m.range()).collect()
}

fn in_comment(comments: &[Range<usize>], at: usize) -> bool {
    comments.iter().any(|span| span.contains(&at))
}

fn is_nested_balanced(inner: &str, open: &Regex, close: &Regex) -> bool {
    let comments = comment_spans(inner);
    let mut events = open
        .find_iter(inner)
        .map(|m| (m.start(), 1i32))
        .chain(close.find_iter(inner).map(|m| (m.start(), -1i32)))
        .filter(|&(at, _)| !in_comment(&comments, at))
        .collect::<Vec<_>>();
    events.sort_unstable();

    let mut depth = 0i32;
    for (_, delta) in events {
        depth += delta;
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

/// Strips leading whitespace and comments. `None` on an unterminated comment.
fn skip_filler(mut text: &str) -> Option<&str> {
    loop {
        text = text.trim_start();
        let Some(after_open) = text.strip_prefix("<!--") else {
            return Some(text);
        };
        let close = after_open.find("-->")?;
        text = &after_open[close + 3..];
    }
}

fn is_filler(text: &str) -> bool {
    skip_filler(text) == Some("")
}

fn find_href(inner: &str) -> Option<Range<usize>> {
    for caps in ANCHOR_HREF.captures_iter(inner) {
        let Some(value) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
            continue;
        };
        let raw = value.as_str();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let start = value.start() + (raw.len() - raw.trim_start().len());
        return Some(start..start + trimmed.len());
    }
    None
}
