//! Keyword/position heuristics for extracting financial-statement tables out
//! of XBRL-derived filing markup.

pub mod error;
pub mod locator;
pub mod shares;
pub mod table;

pub use error::ScrapeError;
pub use locator::find_fragment;
pub use shares::extract_share_count;
pub use table::{parse_number, scrape_statement, ColumnOrder, ScrapedValue, Unit};

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::fs;
use std::path::Path;

pub(crate) static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
pub(crate) static TR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
pub(crate) static TD: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());

/// Elements whose `name` attribute equals the keyword. The filings mark each
/// statement block with a taxonomy element name.
pub(crate) fn keyword_elements<'a>(html: &'a Html, keyword: &str) -> Vec<ElementRef<'a>> {
    // Keywords are taxonomy identifiers (ASCII, no quotes), so the selector
    // string is always parseable.
    let selector = Selector::parse(&format!("[name=\"{}\"]", keyword)).unwrap();
    html.select(&selector).collect()
}

pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// All `td` texts per `tr` under the keyword-matched block. With
/// `drop_blank_cells` the positional heuristics skip empty spacer cells;
/// the share-count lookup keeps them to preserve column alignment.
pub(crate) fn table_rows(html: &Html, keyword: &str, drop_blank_cells: bool) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for element in keyword_elements(html, keyword) {
        for tr in element.select(&TABLE).flat_map(|t| t.select(&TR)) {
            let cells: Vec<String> = tr
                .select(&TD)
                .map(element_text)
                .map(|text| text.trim().to_string())
                .filter(|text| !drop_blank_cells || !text.is_empty())
                .collect();
            rows.push(cells);
        }
    }
    rows
}

pub(crate) fn read_fragment(path: &Path) -> Result<Html, ScrapeError> {
    let markup = fs::read_to_string(path).map_err(|source| ScrapeError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Html::parse_document(&markup))
}
