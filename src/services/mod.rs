//! Services for retrieving pages and extracting date stamps.

pub mod extractor;
pub mod fetcher;

pub use extractor::{DateExtractor, Document, HtmlParser, MarkupParser, match_stamp};
pub use fetcher::{HttpPageClient, PageClient, PageResponse, RetryPolicy, fetch};
