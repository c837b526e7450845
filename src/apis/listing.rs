use super::html::{cell_text, selector};
use crate::app::ports::HttpClientPort;
use crate::constants::{
    COL_ADDRESS, COL_CATEGORY, COL_DORM_LINK, COL_NAME, COL_PHONE, COL_PROVINCE, COL_REMARKS,
    COL_SCORE_LINK, COL_TYPE, LISTING_MIN_COLUMNS,
};
use crate::error::{Result, ScraperError};
use crate::infra::encoding::decode_sniffed;
use crate::types::SchoolRecord;
use scraper::{ElementRef, Html};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

/// Downloads the listing page and turns its first table into school records.
pub struct ListingFetcher {
    http: Arc<dyn HttpClientPort>,
}

impl ListingFetcher {
    pub fn new(http: Arc<dyn HttpClientPort>) -> Self {
        Self { http }
    }

    /// Any failure here is fatal for the run.
    #[instrument(skip(self))]
    pub async fn fetch(&self, listing_url: &str) -> Result<Vec<SchoolRecord>> {
        // No timeout: without the listing there is nothing to do
        let resp = self.http.get(listing_url, None).await?;
        let (html, encoding) = decode_sniffed(&resp.bytes);
        debug!(
            encoding = encoding.name(),
            bytes = resp.bytes.len(),
            "Decoded listing page"
        );
        // Links resolve against where the page actually lives after redirects
        let schools = parse_listing(&html, &resp.final_url)?;
        info!("Parsed {} schools from listing", schools.len());
        Ok(schools)
    }
}

/// Parses the listing table. Rows with fewer than nine cells are dropped.
pub fn parse_listing(html: &str, base_url: &str) -> Result<Vec<SchoolRecord>> {
    let base = Url::parse(base_url)?;
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;
    let link_sel = selector("a")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| ScraperError::MissingTable {
            url: base_url.to_string(),
        })?;

    let mut schools = Vec::new();
    // First row is the header
    for (index, row) in table.select(&row_sel).enumerate().skip(1) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
        if cells.len() < LISTING_MIN_COLUMNS {
            debug!(row = index, cells = cells.len(), "Dropping short listing row");
            continue;
        }
        let link = |col: usize| -> Option<String> {
            cells[col]
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| resolve_link(&base, href))
        };
        schools.push(SchoolRecord {
            id: None,
            name: cell_text(&cells[COL_NAME]),
            province: cell_text(&cells[COL_PROVINCE]),
            school_type: cell_text(&cells[COL_TYPE]),
            category: cell_text(&cells[COL_CATEGORY]),
            phone: cell_text(&cells[COL_PHONE]),
            address: cell_text(&cells[COL_ADDRESS]),
            remarks: cell_text(&cells[COL_REMARKS]),
            dorm_link: link(COL_DORM_LINK),
            score_link: link(COL_SCORE_LINK),
        });
    }
    Ok(schools)
}

/// Resolves `href` against the page it appeared on.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://x/news/2015/1.html";

    fn listing_html(rows: &str) -> String {
        format!(
            "<html><body><table>\
             <tr><td>学校名称</td><td>省份</td><td>性质</td><td>类型</td><td>电话</td>\
             <td>地址</td><td>备注</td><td>宿舍</td><td>分数线</td></tr>{rows}\
             </table></body></html>"
        )
    }

    #[test]
    fn resolves_relative_links_against_page() {
        let base = Url::parse(BASE).unwrap();
        assert_eq!(
            resolve_link(&base, "a/b.html").as_deref(),
            Some("https://x/news/2015/a/b.html")
        );
        assert_eq!(
            resolve_link(&base, "/root.html").as_deref(),
            Some("https://x/root.html")
        );
        assert_eq!(
            resolve_link(&base, "https://other/abs.html").as_deref(),
            Some("https://other/abs.html")
        );
        assert_eq!(resolve_link(&base, "  "), None);
    }

    #[test]
    fn parses_rows_in_source_order() {
        let html = listing_html(
            "<tr><td>甲职业学院</td><td>湖北</td><td>公办</td><td>理工</td><td>027-1</td>\
             <td>武汉</td><td>无</td><td><a href=\"dorm/1.html\">宿舍</a></td>\
             <td><a href=\"score/1.html\">查看</a></td></tr>\
             <tr><td>乙职业学院</td><td>湖北</td><td>民办</td><td>财经</td><td>027-2</td>\
             <td>宜昌</td><td></td><td></td><td><a href=\"score/2.html\">查看</a></td></tr>",
        );
        let schools = parse_listing(&html, BASE).unwrap();
        assert_eq!(schools.len(), 2);

        let first = &schools[0];
        assert_eq!(first.name, "甲职业学院");
        assert_eq!(first.province, "湖北");
        assert_eq!(first.school_type, "公办");
        assert_eq!(first.category, "理工");
        assert_eq!(first.phone, "027-1");
        assert_eq!(first.address, "武汉");
        assert_eq!(first.remarks, "无");
        assert_eq!(first.dorm_link.as_deref(), Some("https://x/news/2015/dorm/1.html"));
        assert_eq!(first.score_link.as_deref(), Some("https://x/news/2015/score/1.html"));
        assert_eq!(first.id, None);

        let second = &schools[1];
        assert_eq!(second.name, "乙职业学院");
        assert_eq!(second.remarks, "");
        assert_eq!(second.dorm_link, None);
        assert_eq!(second.score_link.as_deref(), Some("https://x/news/2015/score/2.html"));
    }

    #[test]
    fn drops_rows_with_fewer_than_nine_cells() {
        let html = listing_html(
            "<tr><td colspan=\"9\">2025年名单</td></tr>\
             <tr><td>甲</td><td>湖北</td><td>公办</td><td>理工</td><td>1</td>\
             <td>武汉</td><td></td><td></td><td></td></tr>",
        );
        let schools = parse_listing(&html, BASE).unwrap();
        assert_eq!(schools.len(), 1);
        assert_eq!(schools[0].name, "甲");
        assert_eq!(schools[0].score_link, None);
    }

    #[test]
    fn anchor_without_href_yields_no_link() {
        let html = listing_html(
            "<tr><td>甲</td><td>湖北</td><td>公办</td><td>理工</td><td>1</td>\
             <td>武汉</td><td></td><td><a>宿舍</a></td><td><a name=\"x\">查看</a></td></tr>",
        );
        let schools = parse_listing(&html, BASE).unwrap();
        assert_eq!(schools[0].dorm_link, None);
        assert_eq!(schools[0].score_link, None);
    }

    #[test]
    fn missing_table_is_fatal() {
        let err = parse_listing("<html><body><p>维护中</p></body></html>", BASE).unwrap_err();
        assert!(matches!(err, ScraperError::MissingTable { .. }));
    }

    struct Redirected;

    #[async_trait::async_trait]
    impl HttpClientPort for Redirected {
        async fn get(
            &self,
            _url: &str,
            _timeout: Option<std::time::Duration>,
        ) -> Result<crate::app::ports::HttpGetResult> {
            let html = listing_html(
                "<tr><td>甲</td><td>湖北</td><td>公办</td><td>理工</td><td>1</td>\
                 <td>武汉</td><td></td><td></td><td><a href=\"score/1.html\">查看</a></td></tr>",
            );
            Ok(crate::app::ports::HttpGetResult {
                bytes: html.into_bytes(),
                final_url: "https://y/list/2025/index.html".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn fetch_resolves_links_against_final_url() {
        let fetcher = ListingFetcher::new(Arc::new(Redirected));
        let schools = fetcher.fetch(BASE).await.unwrap();
        assert_eq!(
            schools[0].score_link.as_deref(),
            Some("https://y/list/2025/score/1.html")
        );
    }

    #[test]
    fn invalid_base_url_is_fatal() {
        assert!(matches!(
            parse_listing(&listing_html(""), "not a url"),
            Err(ScraperError::Url(_))
        ));
    }
}
