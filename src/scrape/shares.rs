use super::{table_rows, ScrapeError};
use scraper::Html;

const TOTAL: &str = "計";
/// "計" also appears inside accounting-standard notes ("会計"); rows carrying
/// that marker are false positives for the total row.
const ACCOUNTING: &str = "会計";

const ANNUAL_LABEL_TOKENS: &[&str] = &["事業", "年度", "末", "現在", "発行", "数"];
const QUARTERLY_LABEL_TOKENS: &[&str] = &["四半期", "末", "現在", "発行", "数"];

/// Does this cell label the "shares issued as of fiscal-year end" column?
/// Annual and quarterly filings word the label differently, so both token
/// sets are accepted.
pub fn is_issued_shares_label(text: &str) -> bool {
    ANNUAL_LABEL_TOKENS.iter().all(|token| text.contains(token))
        || QUARTERLY_LABEL_TOKENS.iter().all(|token| text.contains(token))
}

/// Two-phase positional lookup over the share-count table: the issued-shares
/// label fixes the column, the total row fixes the row, and the cell at their
/// intersection is the outstanding share count (still formatted as printed).
pub fn extract_share_count(html: &Html, keyword: &str) -> Result<String, ScrapeError> {
    let rows = table_rows(html, keyword, false);
    if rows.is_empty() {
        return Err(ScrapeError::NoTable);
    }

    let column_index = rows
        .iter()
        .find(|cells| cells.iter().any(|td| is_issued_shares_label(td)))
        .and_then(|cells| cells.iter().position(|td| is_issued_shares_label(td)))
        .ok_or(ScrapeError::KeywordNotFound)?;

    let row_index = rows
        .iter()
        .position(|cells| {
            cells
                .iter()
                .any(|td| td.contains(TOTAL) && !td.contains(ACCOUNTING))
        })
        .ok_or(ScrapeError::KeywordNotFound)?;

    rows[row_index]
        .get(column_index)
        .cloned()
        .ok_or(ScrapeError::KeywordNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shares_fragment(rows: &str) -> Html {
        Html::parse_document(&format!(
            "<html><body><div name=\"IssuedSharesTotalNumberOfSharesEtcTextBlock\">\
             <table>{}</table></div></body></html>",
            rows
        ))
    }

    const KEYWORD: &str = "IssuedSharesTotalNumberOfSharesEtcTextBlock";

    #[test]
    fn finds_the_cell_at_label_column_and_total_row() {
        let html = shares_fragment(
            "<tr><td>種類</td><td>事業年度末現在発行数（株）</td><td>上場金融商品取引所名</td></tr>\
             <tr><td>普通株式</td><td>12,000,000</td><td>東京証券取引所</td></tr>\
             <tr><td>計</td><td>12,345,678</td><td>－</td></tr>",
        );
        let count = extract_share_count(&html, KEYWORD).unwrap();
        assert_eq!(count, "12,345,678");
    }

    #[test]
    fn quarterly_label_is_accepted() {
        let html = shares_fragment(
            "<tr><td>種類</td><td>第３四半期末現在発行数（株）</td></tr>\
             <tr><td>計</td><td>9,999</td></tr>",
        );
        assert_eq!(extract_share_count(&html, KEYWORD).unwrap(), "9,999");
    }

    #[test]
    fn accounting_total_is_not_the_total_row() {
        let html = shares_fragment(
            "<tr><td>種類</td><td>事業年度末現在発行数</td></tr>\
             <tr><td>会計基準の注記</td><td>0</td></tr>\
             <tr><td>計</td><td>500</td></tr>",
        );
        assert_eq!(extract_share_count(&html, KEYWORD).unwrap(), "500");
    }

    #[test]
    fn empty_fragment_reports_no_table() {
        let html = Html::parse_document(
            "<html><body><div name=\"IssuedSharesTotalNumberOfSharesEtcTextBlock\"></div></body></html>",
        );
        assert!(matches!(
            extract_share_count(&html, KEYWORD),
            Err(ScrapeError::NoTable)
        ));
    }

    #[test]
    fn missing_label_reports_keyword_not_found() {
        let html = shares_fragment("<tr><td>種類</td><td>株式の内容</td></tr><tr><td>計</td><td>1</td></tr>");
        assert!(matches!(
            extract_share_count(&html, KEYWORD),
            Err(ScrapeError::KeywordNotFound)
        ));
    }
}
