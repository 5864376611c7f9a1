use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Statement families the scraper knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StatementType {
    BalanceSheet,
    ProfitAndLoss,
    NumberOfShares,
}

impl StatementType {
    pub fn code(&self) -> &'static str {
        match self {
            StatementType::BalanceSheet => "1",
            StatementType::ProfitAndLoss => "2",
            StatementType::NumberOfShares => "3",
        }
    }
}

impl FromStr for StatementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(StatementType::BalanceSheet),
            "2" => Ok(StatementType::ProfitAndLoss),
            "3" => Ok(StatementType::NumberOfShares),
            other => Err(format!("unknown statement type code: {}", other)),
        }
    }
}

impl TryFrom<String> for StatementType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        StatementType::from_str(&s)
    }
}

impl From<StatementType> for String {
    fn from(s: StatementType) -> String {
        s.code().to_string()
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementType::BalanceSheet => write!(f, "balance sheet"),
            StatementType::ProfitAndLoss => write!(f, "profit and loss"),
            StatementType::NumberOfShares => write!(f, "number of shares"),
        }
    }
}

/// The share count is stored under this fixed pseudo-subject id; it has no
/// master entry because it is not a statement line item.
pub const NUMBER_OF_SHARES_SUBJECT_ID: &str = "0";

/// One entry of the line-item master. Several detail subjects can roll up to
/// the same outline category; `detail_id` fixes the tie-break order when more
/// than one of them was extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub id: &'static str,
    pub outline_id: &'static str,
    pub detail_id: &'static str,
    pub name: &'static str,
}

/// Balance-sheet aggregates required by the valuation formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BsCategory {
    TotalCurrentAssets,
    TotalInvestmentsAndOtherAssets,
    TotalCurrentLiabilities,
    TotalFixedLiabilities,
}

impl BsCategory {
    pub fn outline_id(&self) -> &'static str {
        match self {
            BsCategory::TotalCurrentAssets => "1",
            BsCategory::TotalInvestmentsAndOtherAssets => "2",
            BsCategory::TotalCurrentLiabilities => "3",
            BsCategory::TotalFixedLiabilities => "4",
        }
    }

    pub fn subject_name(&self) -> &'static str {
        match self {
            BsCategory::TotalCurrentAssets => "流動資産合計",
            BsCategory::TotalInvestmentsAndOtherAssets => "投資その他の資産合計",
            BsCategory::TotalCurrentLiabilities => "流動負債合計",
            BsCategory::TotalFixedLiabilities => "固定負債合計",
        }
    }
}

/// Profit-and-loss line items required by the valuation formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlCategory {
    OperatingProfit,
}

impl PlCategory {
    pub fn outline_id(&self) -> &'static str {
        match self {
            PlCategory::OperatingProfit => "1",
        }
    }

    pub fn subject_name(&self) -> &'static str {
        match self {
            PlCategory::OperatingProfit => "営業利益",
        }
    }
}

/// Balance-sheet subject master. Filings label equivalent aggregates in a few
/// different ways, so each outline category carries its known aliases as
/// detail subjects.
pub const BS_SUBJECTS: &[Subject] = &[
    Subject { id: "1", outline_id: "1", detail_id: "1", name: "流動資産合計" },
    Subject { id: "2", outline_id: "1", detail_id: "2", name: "流動資産計" },
    Subject { id: "3", outline_id: "2", detail_id: "1", name: "投資その他の資産合計" },
    Subject { id: "4", outline_id: "2", detail_id: "2", name: "投資その他の資産計" },
    Subject { id: "5", outline_id: "2", detail_id: "3", name: "投資等" },
    Subject { id: "6", outline_id: "3", detail_id: "1", name: "流動負債合計" },
    Subject { id: "7", outline_id: "3", detail_id: "2", name: "流動負債計" },
    Subject { id: "8", outline_id: "4", detail_id: "1", name: "固定負債合計" },
    Subject { id: "9", outline_id: "4", detail_id: "2", name: "固定負債計" },
];

/// Profit-and-loss subject master.
pub const PL_SUBJECTS: &[Subject] = &[
    Subject { id: "1", outline_id: "1", detail_id: "1", name: "営業利益" },
    Subject { id: "2", outline_id: "1", detail_id: "2", name: "営業損失" },
    Subject { id: "3", outline_id: "1", detail_id: "3", name: "営業利益又は営業損失（△）" },
];

pub fn subjects_for(statement: StatementType) -> &'static [Subject] {
    match statement {
        StatementType::BalanceSheet => BS_SUBJECTS,
        StatementType::ProfitAndLoss => PL_SUBJECTS,
        StatementType::NumberOfShares => &[],
    }
}

/// Detail subjects of one outline category, in the fixed tie-break order
/// (ascending detail-subject id).
pub fn subjects_of_outline(statement: StatementType, outline_id: &str) -> Vec<&'static Subject> {
    let mut subjects: Vec<&Subject> = subjects_for(statement)
        .iter()
        .filter(|s| s.outline_id == outline_id)
        .collect();
    subjects.sort_by_key(|s| s.detail_id);
    subjects
}

/// Match a scraped row label against the master. Labels come out of the
/// markup with stray whitespace around them.
pub fn match_subject(statement: StatementType, label: &str) -> Option<&'static Subject> {
    let label = label.trim();
    subjects_for(statement).iter().find(|s| s.name == label)
}

/// Fragment-locating keyword, one per known layout of a statement within a
/// filing. Tried in order; the first keyword with a matching fragment wins.
#[derive(Debug, Clone, Copy)]
pub struct ScrapeKeyword {
    pub keyword: &'static str,
    pub remarks: &'static str,
}

const BS_KEYWORDS: &[ScrapeKeyword] = &[
    ScrapeKeyword { keyword: "ConsolidatedBalanceSheetTextBlock", remarks: "連結貸借対照表" },
    ScrapeKeyword { keyword: "BalanceSheetTextBlock", remarks: "貸借対照表" },
];

const PL_KEYWORDS: &[ScrapeKeyword] = &[
    ScrapeKeyword { keyword: "ConsolidatedStatementOfIncomeTextBlock", remarks: "連結損益計算書" },
    ScrapeKeyword { keyword: "StatementOfIncomeTextBlock", remarks: "損益計算書" },
];

const SHARES_KEYWORDS: &[ScrapeKeyword] = &[
    ScrapeKeyword { keyword: "IssuedSharesTotalNumberOfSharesEtcTextBlock", remarks: "株式総数" },
];

pub fn scrape_keywords(statement: StatementType) -> &'static [ScrapeKeyword] {
    match statement {
        StatementType::BalanceSheet => BS_KEYWORDS,
        StatementType::ProfitAndLoss => PL_KEYWORDS,
        StatementType::NumberOfShares => SHARES_KEYWORDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_subjects_come_back_in_detail_order() {
        let subjects =
            subjects_of_outline(StatementType::BalanceSheet, BsCategory::TotalInvestmentsAndOtherAssets.outline_id());
        let detail_ids: Vec<_> = subjects.iter().map(|s| s.detail_id).collect();
        assert_eq!(detail_ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn label_matching_trims_whitespace() {
        let subject = match_subject(StatementType::BalanceSheet, " 流動資産合計 ").unwrap();
        assert_eq!(subject.outline_id, BsCategory::TotalCurrentAssets.outline_id());
        assert!(match_subject(StatementType::BalanceSheet, "現金及び預金").is_none());
    }

    #[test]
    fn statement_type_code_round_trip() {
        for statement in [
            StatementType::BalanceSheet,
            StatementType::ProfitAndLoss,
            StatementType::NumberOfShares,
        ] {
            assert_eq!(StatementType::from_str(statement.code()), Ok(statement));
        }
        assert!(StatementType::from_str("9").is_err());
    }
}
