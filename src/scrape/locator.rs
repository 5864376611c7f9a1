use super::{element_text, keyword_elements, read_fragment, ScrapeError};
use std::fs;
use std::path::{Path, PathBuf};

/// Candidate statement files carry this token in their filename; everything
/// else in a decoded filing (headers, audit reports, images) is skipped
/// before any markup is parsed.
pub const BODY_FILE_TOKEN: &str = "honbun";

/// Find the single file in a decoded filing folder whose markup contains an
/// element named `keyword`.
///
/// Zero matches is an expected miss and comes back as `Ok(None)`: the filing
/// simply does not use this keyword and the caller counts a failed attempt.
/// Two or more matches means the filing violates the one-fragment-per-keyword
/// assumption, which nobody can resolve automatically.
pub fn find_fragment(folder: &Path, keyword: &str) -> Result<Option<PathBuf>, ScrapeError> {
    let entries = fs::read_dir(folder).map_err(|source| ScrapeError::Unreadable {
        path: folder.to_path_buf(),
        source,
    })?;

    let mut matches: Vec<PathBuf> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if !file_name.contains(BODY_FILE_TOKEN) {
            continue;
        }

        let html = read_fragment(&path)?;
        let has_keyword = keyword_elements(&html, keyword)
            .into_iter()
            .any(|element| !element_text(element).trim().is_empty());
        if has_keyword {
            matches.push(path);
        }
    }

    match matches.len() {
        0 => {
            log::info!("no file matched keyword \"{}\" in {:?}", keyword, folder);
            Ok(None)
        }
        1 => Ok(matches.pop()),
        count => {
            for path in &matches {
                log::error!("multiple file error: keyword \"{}\" matched {:?}", keyword, path);
            }
            Err(ScrapeError::AmbiguousFragments {
                keyword: keyword.to_string(),
                count,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn fragment(keyword: &str) -> String {
        format!(
            "<html><body><div name=\"{}\"><table><tr><td>流動資産合計</td><td>100</td></tr></table></div></body></html>",
            keyword
        )
    }

    #[test]
    fn zero_matches_is_not_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("0101000_honbun_a.htm"), fragment("SomethingElse")).unwrap();

        let found = find_fragment(dir.path(), "BalanceSheetTextBlock").unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn single_match_returns_the_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("0101000_honbun_a.htm"), fragment("BalanceSheetTextBlock")).unwrap();
        fs::write(dir.path().join("0102000_honbun_b.htm"), fragment("StatementOfIncomeTextBlock")).unwrap();
        // Non-body files never participate, keyword match or not.
        fs::write(dir.path().join("0000000_header.htm"), fragment("BalanceSheetTextBlock")).unwrap();

        let found = find_fragment(dir.path(), "BalanceSheetTextBlock").unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "0101000_honbun_a.htm");
    }

    #[test]
    fn multiple_matches_is_a_structural_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("0101000_honbun_a.htm"), fragment("BalanceSheetTextBlock")).unwrap();
        fs::write(dir.path().join("0102000_honbun_b.htm"), fragment("BalanceSheetTextBlock")).unwrap();

        let err = find_fragment(dir.path(), "BalanceSheetTextBlock").unwrap_err();
        assert!(err.is_structural());
        assert!(matches!(err, ScrapeError::AmbiguousFragments { count: 2, .. }));
    }

    #[test]
    fn keyword_element_with_empty_text_does_not_match() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("0101000_honbun_a.htm"),
            "<html><body><div name=\"BalanceSheetTextBlock\">  </div></body></html>",
        )
        .unwrap();

        let found = find_fragment(dir.path(), "BalanceSheetTextBlock").unwrap();
        assert!(found.is_none());
    }
}
