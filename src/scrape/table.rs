use super::{element_text, keyword_elements, table_rows, ScrapeError, TABLE};
use crate::subjects::{match_subject, StatementType, Subject};
use scraper::Html;

/// Monetary scale of a statement table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    ThousandsOfYen,
    MillionsOfYen,
}

impl Unit {
    pub fn marker(&self) -> &'static str {
        match self {
            Unit::ThousandsOfYen => "千円",
            Unit::MillionsOfYen => "百万円",
        }
    }

    pub fn scale(&self) -> i64 {
        match self {
            Unit::ThousandsOfYen => 1_000,
            Unit::MillionsOfYen => 1_000_000,
        }
    }
}

/// Scan the tables under the keyword-matched block for a unit marker.
/// Thousands is checked first; if a filing somehow carries both markers the
/// finer unit wins. No marker at all makes every extracted amount unusable.
pub fn resolve_unit(html: &Html, keyword: &str) -> Result<Unit, ScrapeError> {
    for unit in [Unit::ThousandsOfYen, Unit::MillionsOfYen] {
        let found = keyword_elements(html, keyword)
            .into_iter()
            .flat_map(|element| element.select(&TABLE))
            .any(|table| element_text(table).contains(unit.marker()));
        if found {
            return Ok(unit);
        }
    }
    Err(ScrapeError::UnitNotFound)
}

/// Which period the first value column of a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOrder {
    PreviousFirst,
    CurrentFirst,
}

impl ColumnOrder {
    /// Used when row 1 is too short to carry any period marker. Absence of
    /// evidence defaults to the more common current-first layout; this is a
    /// deliberate policy, not an accident of indexing.
    pub const DEFAULT: ColumnOrder = ColumnOrder::CurrentFirst;

    /// Inspect row index 1: a previous-period marker in its first cell or a
    /// current-period marker in its second cell means the table lists the
    /// prior fiscal year before the current one.
    pub fn detect(rows: &[Vec<String>]) -> ColumnOrder {
        let row = match rows.get(1) {
            Some(row) => row,
            None => return Self::DEFAULT,
        };
        match (row.first(), row.get(1)) {
            (Some(first), Some(second)) => {
                if first.contains('前') || second.contains('当') {
                    ColumnOrder::PreviousFirst
                } else {
                    ColumnOrder::CurrentFirst
                }
            }
            _ => Self::DEFAULT,
        }
    }

    fn current_column(&self, cells: &[String]) -> Option<usize> {
        match cells.len() {
            0 | 1 => None,
            // Label plus a single value column.
            2 => Some(1),
            _ => match self {
                ColumnOrder::PreviousFirst => Some(2),
                ColumnOrder::CurrentFirst => Some(1),
            },
        }
    }
}

/// One extracted line item: the matched master subject and the parsed
/// current-period amount. `None` records "looked for, not found".
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedValue {
    pub subject: &'static Subject,
    pub value: Option<i64>,
}

/// Extract every row of the keyword-matched statement table that corresponds
/// to a known master subject. Rows with unknown labels are dropped silently;
/// a filing carries many more line items than the valuation needs.
pub fn scrape_statement(
    html: &Html,
    keyword: &str,
    statement: StatementType,
) -> Result<Vec<ScrapedValue>, ScrapeError> {
    let unit = resolve_unit(html, keyword)?;
    let rows = table_rows(html, keyword, true);
    let order = ColumnOrder::detect(&rows);

    Ok(rows
        .iter()
        .filter_map(|cells| {
            let label = cells.first()?;
            let subject = match_subject(statement, label)?;
            let value = order
                .current_column(cells)
                .and_then(|idx| cells.get(idx))
                .and_then(|cell| parse_number(cell))
                .map(|n| n * unit.scale());
            Some(ScrapedValue { subject, value })
        })
        .collect())
}

/// Parse a formatted table amount. Handles thousands separators (ASCII and
/// full-width), the △/▲ negative prefixes and the dash characters filings
/// use for "no value". Anything unparseable is treated as no value.
pub fn parse_number(text: &str) -> Option<i64> {
    let mut cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '，' | '※' | ' ' | '　'))
        .collect();

    let negative = cleaned.starts_with('△') || cleaned.starts_with('▲');
    if negative {
        cleaned = cleaned.chars().skip(1).collect();
    }

    if cleaned.is_empty() || matches!(cleaned.as_str(), "-" | "－" | "―" | "—" | "ー") {
        return None;
    }

    cleaned
        .parse::<i64>()
        .ok()
        .map(|n| if negative { -n } else { n })
}
