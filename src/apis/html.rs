use crate::error::{Result, ScraperError};
use scraper::{ElementRef, Selector};

pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScraperError::Selector(format!("{css}: {e:?}")))
}

/// Trims the text and drops every non-breaking space.
pub fn normalize_cell(text: &str) -> String {
    text.trim().replace('\u{a0}', "")
}

/// Cell text as the site renders it: every text fragment trimmed, then joined,
/// with non-breaking spaces dropped.
pub fn cell_text(cell: &ElementRef<'_>) -> String {
    let joined: String = cell.text().map(str::trim).collect();
    normalize_cell(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn strips_trailing_nbsp() {
        assert_eq!(normalize_cell("100\u{a0}"), "100");
        assert_eq!(normalize_cell("1\u{a0}00"), "100");
        assert_eq!(normalize_cell("  普通类 "), "普通类");
    }

    #[test]
    fn joins_trimmed_fragments() {
        let doc = Html::parse_fragment("<table><tr><td> 职业 <br> 技能&nbsp;</td></tr></table>");
        let td = selector("td").unwrap();
        let cell = doc.select(&td).next().unwrap();
        assert_eq!(cell_text(&cell), "职业技能");
    }
}
