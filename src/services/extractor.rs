// src/services/extractor.rs

//! Date stamp extraction from product pages.
//!
//! Pages carry a build stamp in their main heading, e.g.
//! `Product 01102025_205131`, laid out as `DDMMYYYY_HHMMSS`. The first
//! heading containing such a token wins.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::error::{ConfigError, ExtractionError, Result};
use crate::models::Observation;

static STAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{2})([0-9]{2})([0-9]{4})_[0-9]{6}").expect("valid date stamp pattern")
});

/// A parsed markup tree.
pub trait Document {
    /// Text content of every element matching `selector`, in document order.
    fn element_texts(&self, selector: &Selector) -> Vec<String>;
}

/// Turns raw page content into a [`Document`].
pub trait MarkupParser: Send + Sync {
    type Document: Document;

    fn parse(&self, content: &str) -> Self::Document;
}

/// Tolerant HTML parser; malformed markup is repaired, never rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlParser;

/// HTML tree produced by [`HtmlParser`].
pub struct HtmlDocument(Html);

impl Document for HtmlDocument {
    fn element_texts(&self, selector: &Selector) -> Vec<String> {
        self.0
            .select(selector)
            .map(|element| element.text().collect())
            .collect()
    }
}

impl MarkupParser for HtmlParser {
    type Document = HtmlDocument;

    fn parse(&self, content: &str) -> HtmlDocument {
        HtmlDocument(Html::parse_document(content))
    }
}

/// Finds the date stamp in a page's headings.
pub struct DateExtractor<P: MarkupParser = HtmlParser> {
    parser: P,
    heading: Selector,
}

impl DateExtractor<HtmlParser> {
    /// Extractor over HTML searching `heading_tag` elements.
    pub fn new(heading_tag: &str) -> Result<Self> {
        Self::with_parser(HtmlParser, heading_tag)
    }
}

impl Default for DateExtractor<HtmlParser> {
    fn default() -> Self {
        Self {
            parser: HtmlParser,
            heading: Selector::parse("h1").expect("valid heading selector"),
        }
    }
}

impl<P: MarkupParser> DateExtractor<P> {
    pub fn with_parser(parser: P, heading_tag: &str) -> Result<Self> {
        let heading = Selector::parse(heading_tag)
            .map_err(|e| ConfigError::invalid("checker.heading_tag", format!("{e:?}")))?;
        Ok(Self { parser, heading })
    }

    /// Extract the first heading date stamp from `content`.
    pub fn extract(&self, content: &str) -> std::result::Result<Observation, ExtractionError> {
        let document = self.parser.parse(content);
        document
            .element_texts(&self.heading)
            .iter()
            .find_map(|text| match_stamp(text))
            .ok_or(ExtractionError::NotFound)
    }
}

/// Match the stamp pattern against one heading's text.
pub fn match_stamp(text: &str) -> Option<Observation> {
    let caps = STAMP_PATTERN.captures(text)?;
    Some(Observation::new(
        &caps[0],
        &caps[1],
        &caps[2],
        &caps[3],
        text.trim(),
    ))
}
