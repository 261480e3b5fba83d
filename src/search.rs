//! Paginated catalog search
//!
//! Pages are fetched strictly in order because each response may rotate
//! session cookies the next page depends on. Result items are the elements
//! carrying an `fn_detail('...')` click handler; the quoted argument is the
//! opaque detail reference handed to the resolver later.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::extract::Patterns;
use crate::http_client::{encode_form, RedirectMode, UpstreamClient, UpstreamRequest};
use crate::login::LoginFlow;
use crate::urls::{normalize_image_url, resolve_location};

/// Hard cap on records returned by one search.
pub const MAX_RESULTS: usize = 100;
pub const DEFAULT_MAX_PAGES: u32 = 5;
pub const DEFAULT_PAGE_SIZE: u32 = 30;

const DEBUG_HEAD_CHARS: usize = 1200;

/// Image attributes in priority order (lazy-loading attributes first).
const IMAGE_ATTRS: [&str; 4] = ["data-src", "data-original", "data-lazy", "src"];

static FN_DETAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)fn_detail\(\s*'([^']+)'").unwrap());

static BACKGROUND_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).unwrap());

static LOGIN_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)login|로그인|member/login\.do|doLogin").unwrap());

static DETAIL_LINKS: LazyLock<Selector> = LazyLock::new(|| selector("[onclick*='fn_detail']"));
static DETAIL_ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("a[onclick*='fn_detail']"));
static CARDS: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        "li, .item, .list, .result, .cont, .tit_area, .thumb_area, .img_area, .video_list, .vod_list",
    )
});
static IMAGES: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static BACKGROUND_STYLES: LazyLock<Selector> = LazyLock::new(|| selector("[style*='background']"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

/// Caller-supplied search parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchQuery {
    pub keyword: String,
    pub max_pages: u32,
    pub page_size: u32,
    /// Attach a page-1 diagnostic snapshot to the outcome
    pub debug: bool,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            max_pages: DEFAULT_MAX_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
            debug: false,
        }
    }
}

impl SearchQuery {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn pages(mut self, max_pages: u32, page_size: u32) -> Self {
        self.max_pages = max_pages;
        self.page_size = page_size;
        self
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRecord {
    pub title: String,
    /// Opaque `fn_detail` argument; only the resolver interprets it
    #[serde(rename = "detailUrl")]
    pub detail_reference: String,
    pub thumbnail: Option<String>,
}

/// Diagnostics about the first result page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub html_len: usize,
    pub has_fn_detail: bool,
    pub found_fn_detail: usize,
    pub looks_like_login_page: bool,
    pub head: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceivedQuery {
    pub keyword: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDebug {
    pub received: ReceivedQuery,
    pub page_size: u32,
    pub max_pages: u32,
    pub page1: PageSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub items: Vec<SearchRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<SearchDebug>,
}

/// Drives the paginated search form.
#[derive(Clone)]
pub struct SearchPaginator {
    client: UpstreamClient,
    login: LoginFlow,
    config: Arc<Config>,
    patterns: Arc<Patterns>,
}

impl SearchPaginator {
    pub fn new(
        client: UpstreamClient,
        login: LoginFlow,
        config: Arc<Config>,
        patterns: Arc<Patterns>,
    ) -> Self {
        Self {
            client,
            login,
            config,
            patterns,
        }
    }

    /// Search up to `max_pages` pages, returning at most [`MAX_RESULTS`] unique records.
    #[instrument(
        skip(self, query),
        fields(
            keyword = %query.keyword,
            max_pages = query.max_pages,
            page_size = query.page_size
        )
    )]
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome> {
        let keyword = query.keyword.trim();
        if keyword.is_empty() {
            return Err(ProxyError::Validation("keyword required".to_string()));
        }
        if query.max_pages == 0 || query.page_size == 0 {
            return Err(ProxyError::Validation(
                "maxPages and pageSize must be positive".to_string(),
            ));
        }

        self.login.ensure_session().await?;

        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut snapshot = None;

        for page_index in 1..=query.max_pages {
            let html = self.fetch_page(keyword, page_index, query.page_size).await?;

            if page_index == 1 {
                debug!(
                    html_len = html.len(),
                    has_fn_detail = html.contains("fn_detail("),
                    "First result page received"
                );
                if query.debug {
                    snapshot = Some(SearchDebug {
                        received: ReceivedQuery {
                            keyword: keyword.to_string(),
                        },
                        page_size: query.page_size,
                        max_pages: query.max_pages,
                        page1: snapshot_page(&html),
                    });
                }
            }

            let added = parse_page(
                &html,
                self.config.origin(),
                &self.patterns,
                &mut seen,
                &mut items,
            );
            debug!(page_index, added, total = items.len(), "Result page parsed");

            if items.len() >= MAX_RESULTS {
                break;
            }
        }

        info!(results = items.len(), "Search complete");
        Ok(SearchOutcome {
            items,
            debug: snapshot,
        })
    }

    /// POST the filter form; re-drive a redirect with a GET if one comes back.
    async fn fetch_page(&self, keyword: &str, page_index: u32, page_size: u32) -> Result<String> {
        let search_url = self.config.search_url();
        let page_index = page_index.to_string();
        let page_size = page_size.to_string();

        let body = encode_form(&[
            ("cntntsTy", "original"),
            ("baseKeyword", keyword),
            ("category", "ALL"),
            ("clorYn", "N"),
            ("koglTyYn", "N"),
            ("mediaTyYn", "N"),
            ("dwldPosblAtYn", "N"),
            ("pageIndex", page_index.as_str()),
            ("pageUnit", page_size.as_str()),
            ("pageSize", page_size.as_str()),
        ]);

        let request = UpstreamRequest::post_form(&search_url, body)
            .header("Origin", self.config.origin())
            .header("Referer", &search_url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .redirect(RedirectMode::Manual);

        let response = self.client.send(request).await?;

        let next = response
            .is_redirect()
            .then(|| response.location())
            .flatten()
            .and_then(|location| resolve_location(&search_url, location));

        match next {
            Some(url) => {
                debug!(%url, "Search POST redirected");
                let followed = self
                    .client
                    .send(UpstreamRequest::get(url).header("Referer", &search_url))
                    .await?;
                Ok(followed.body)
            }
            None => Ok(response.body),
        }
    }
}

/// Extract records from one result page into `out`, skipping references in `seen`.
///
/// Stops once `out` holds [`MAX_RESULTS`] records. Returns how many were added.
pub fn parse_page(
    html: &str,
    origin: &str,
    patterns: &Patterns,
    seen: &mut HashSet<String>,
    out: &mut Vec<SearchRecord>,
) -> usize {
    let document = Html::parse_document(html);
    let before = out.len();

    for element in document.select(&DETAIL_LINKS) {
        if out.len() >= MAX_RESULTS {
            break;
        }

        let title = collapse_whitespace(&element.text().collect::<String>());
        let onclick = element.value().attr("onclick").unwrap_or_default().trim();
        let Some(reference) = FN_DETAIL
            .captures(onclick)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            continue;
        };

        if title.is_empty() || seen.contains(&reference) {
            continue;
        }

        let thumbnail = nearest_card(element)
            .and_then(|card| card_thumbnail(card, patterns))
            .and_then(|raw| normalize_image_url(origin, &raw));

        seen.insert(reference.clone());
        out.push(SearchRecord {
            title,
            detail_reference: reference,
            thumbnail,
        });
    }

    out.len() - before
}

/// The element itself or its closest ancestor that looks like a result card.
fn nearest_card(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find(|candidate| CARDS.matches(candidate))
}

/// Card thumbnail: image attribute, then inline background, then catalog URL.
fn card_thumbnail(card: ElementRef<'_>, patterns: &Patterns) -> Option<String> {
    image_attribute(card)
        .or_else(|| background_image(card))
        .or_else(|| patterns.catalog_image(&card.inner_html()))
}

fn image_attribute(card: ElementRef<'_>) -> Option<String> {
    let img = card.select(&IMAGES).next()?;
    IMAGE_ATTRS
        .iter()
        .filter_map(|attr| img.value().attr(attr))
        .find(|value| !value.trim().is_empty())
        .map(|value| value.trim().to_string())
}

fn background_image(card: ElementRef<'_>) -> Option<String> {
    let styled = card.select(&BACKGROUND_STYLES).next()?;
    let style = styled.value().attr("style")?;
    BACKGROUND_URL
        .captures(style)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|url| !url.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn snapshot_page(html: &str) -> PageSnapshot {
    let document = Html::parse_document(html);
    PageSnapshot {
        html_len: html.chars().count(),
        has_fn_detail: html.contains("fn_detail("),
        found_fn_detail: document.select(&DETAIL_ANCHORS).count(),
        looks_like_login_page: LOGIN_MARKERS.is_match(html),
        head: html.chars().take(DEBUG_HEAD_CHARS).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::testing::{result_page, Reply, ScriptedTransport};

    const ORIGIN: &str = "https://nanuri.ktv.go.kr";

    fn patterns() -> Patterns {
        Patterns::new(&Config::default()).unwrap()
    }

    fn parse(html: &str) -> Vec<SearchRecord> {
        let mut out = Vec::new();
        parse_page(html, ORIGIN, &patterns(), &mut HashSet::new(), &mut out);
        out
    }

    fn paginator(
        config: Config,
        replies: Vec<Reply>,
    ) -> (SearchPaginator, Arc<ScriptedTransport>, Session) {
        let transport = Arc::new(ScriptedTransport::new(replies));
        let session = Session::new();
        let client = UpstreamClient::new(transport.clone(), session.clone());
        let config = Arc::new(config);
        let patterns = Arc::new(Patterns::new(&config).unwrap());
        let login = LoginFlow::new(client.clone(), config.clone());
        (
            SearchPaginator::new(client, login, config, patterns),
            transport,
            session,
        )
    }

    async fn authenticated(replies: Vec<Reply>) -> (SearchPaginator, Arc<ScriptedTransport>) {
        let (paginator, transport, session) = paginator(Config::default(), replies);
        session.absorb(&["JSESSIONID=abc"]).await;
        (paginator, transport)
    }

    fn numbered(prefix: &str, count: usize) -> Vec<(String, String)> {
        (0..count)
            .map(|i| (format!("{prefix} {i}"), format!("/ktv/detail.do?id={prefix}{i}")))
            .collect()
    }

    fn page_of(items: &[(String, String)]) -> Reply {
        let refs: Vec<(&str, &str)> = items.iter().map(|(t, r)| (t.as_str(), r.as_str())).collect();
        Reply::ok(&result_page(&refs))
    }

    // ─── Page parsing ────────────────────────────────────────────────────────

    #[test]
    fn extracts_title_and_reference() {
        let html = r#"<ul><li><a onclick="fn_detail( '/ktv/selectOriganlShotDetail.do?id=7' );">
            Spring   festival
            footage</a></li></ul>"#;
        let records = parse(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Spring festival footage");
        assert_eq!(records[0].detail_reference, "/ktv/selectOriganlShotDetail.do?id=7");
        assert_eq!(records[0].thumbnail, None);
    }

    #[test]
    fn skips_items_without_title_or_argument() {
        let html = r#"
            <a onclick="fn_detail('/a')">   </a>
            <a onclick="fn_detail()">No argument</a>
            <a onclick="fn_detail(&quot;/double&quot;)">Double quoted</a>
            <a onclick="javascript:fn_detail('/b')">Kept</a>"#;
        let records = parse(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].detail_reference, "/b");
    }

    #[test]
    fn thumbnail_prefers_lazy_attributes() {
        let html = r#"<li>
            <img src="/placeholder.gif" data-lazy="/lazy.jpg" data-src="" data-original="/orig.jpg">
            <a onclick="fn_detail('/d')">Clip</a></li>"#;
        assert_eq!(
            parse(html)[0].thumbnail.as_deref(),
            Some("https://nanuri.ktv.go.kr/orig.jpg")
        );
    }

    #[test]
    fn thumbnail_from_background_style() {
        let html = r#"<div class="item">
            <span class="thumb" style="background: url('/thumbs/9.png') no-repeat"></span>
            <a onclick="fn_detail('/d')">Clip</a></div>"#;
        assert_eq!(
            parse(html)[0].thumbnail.as_deref(),
            Some("https://nanuri.ktv.go.kr/thumbs/9.png")
        );
    }

    #[test]
    fn thumbnail_from_catalog_url_in_markup() {
        let html = r#"<div class="vod_list">
            <script>var poster = "https://nps.ktv.go.kr/media/2021/Catalog/4411.jpg";</script>
            <a onclick="fn_detail('/d')">Clip</a></div>"#;
        assert_eq!(
            parse(html)[0].thumbnail.as_deref(),
            Some("https://nps.ktv.go.kr/media/2021/Catalog/4411.jpg")
        );
    }

    #[test]
    fn image_beats_background() {
        let html = r#"<li>
            <div style="background-image:url(/bg.jpg)"></div>
            <img src="https://cdn.example/img.jpg">
            <a onclick="fn_detail('/d')">Clip</a></li>"#;
        assert_eq!(parse(html)[0].thumbnail.as_deref(), Some("https://cdn.example/img.jpg"));
    }

    #[test]
    fn bare_relative_thumbnail_is_anchored_at_origin() {
        let html = r#"<li><img src="upload/t.jpg"><a onclick="fn_detail('/d')">Clip</a></li>"#;
        assert_eq!(
            parse(html)[0].thumbnail.as_deref(),
            Some("https://nanuri.ktv.go.kr/upload/t.jpg")
        );
    }

    #[test]
    fn no_card_means_no_thumbnail() {
        let html = r#"<div><img src="/x.jpg"><a onclick="fn_detail('/d')">Clip</a></div>"#;
        assert_eq!(parse(html)[0].thumbnail, None);
    }

    #[test]
    fn duplicates_within_a_page_are_dropped() {
        let html = result_page(&[("A", "/1"), ("A again", "/1"), ("B", "/2")]);
        let records = parse(&html);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "A");
    }

    #[test]
    fn snapshot_flags_login_pages() {
        let snap =
            snapshot_page(r#"<form action="/member/doLogin.do"><input name="userId"></form>"#);
        assert!(snap.looks_like_login_page);
        assert!(!snap.has_fn_detail);
        assert_eq!(snap.found_fn_detail, 0);

        let html = result_page(&[("A", "/1")]);
        let snap = snapshot_page(&html);
        assert!(snap.has_fn_detail);
        assert_eq!(snap.found_fn_detail, 1);
        assert_eq!(snap.head.chars().count(), html.chars().count().min(DEBUG_HEAD_CHARS));
    }

    // ─── Pagination ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_keyword_is_rejected_for_any_window() {
        for (pages, size) in [(1, 1), (0, 0), (5, 30), (1000, 1000)] {
            let (paginator, transport) = authenticated(vec![]).await;
            let err = paginator
                .search(&SearchQuery::new("   ").pages(pages, size))
                .await
                .unwrap_err();
            assert!(matches!(err, ProxyError::Validation(_)));
            assert_eq!(transport.request_count(), 0);
        }
    }

    #[tokio::test]
    async fn zero_window_is_rejected() {
        let (paginator, _) = authenticated(vec![]).await;
        let err = paginator
            .search(&SearchQuery::new("news").pages(0, 30))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));
    }

    #[tokio::test]
    async fn login_failure_is_auth_error() {
        let (paginator, transport, _) = paginator(Config::default(), vec![]);
        let err = paginator.search(&SearchQuery::new("news")).await.unwrap_err();
        assert!(matches!(err, ProxyError::Auth(_)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn logs_in_lazily_before_first_page() {
        let config = Config {
            username: "u".into(),
            password: "p".into(),
            ..Config::default()
        };
        let (paginator, transport, _) = paginator(
            config,
            vec![
                Reply::ok("").cookie("JSESSIONID=1"),
                Reply::ok(""),
                Reply::ok(&result_page(&[("Hit", "/1")])),
            ],
        );

        let outcome = paginator
            .search(&SearchQuery::new("news").pages(1, 10))
            .await
            .unwrap();
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn no_matches_is_an_empty_result() {
        let empty = result_page(&[]);
        let (paginator, transport) =
            authenticated(vec![Reply::ok(&empty), Reply::ok(&empty), Reply::ok(&empty)]).await;

        let outcome = paginator
            .search(&SearchQuery::new("nothing").pages(3, 30))
            .await
            .unwrap();
        assert!(outcome.items.is_empty());
        assert!(outcome.debug.is_none());
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn references_seen_on_earlier_pages_are_not_repeated() {
        let (paginator, _) = authenticated(vec![
            Reply::ok(&result_page(&[("A", "/1"), ("B", "/2")])),
            Reply::ok(&result_page(&[("B on page 2", "/2"), ("C", "/3")])),
        ])
        .await;

        let outcome = paginator
            .search(&SearchQuery::new("x").pages(2, 2))
            .await
            .unwrap();
        let refs: Vec<_> = outcome.items.iter().map(|r| r.detail_reference.as_str()).collect();
        assert_eq!(refs, ["/1", "/2", "/3"]);
        assert_eq!(outcome.items[1].title, "B");
    }

    #[tokio::test]
    async fn never_more_than_one_hundred_records() {
        let (paginator, transport) = authenticated(vec![
            page_of(&numbered("a", 60)),
            page_of(&numbered("b", 60)),
            page_of(&numbered("c", 60)),
        ])
        .await;

        let outcome = paginator
            .search(&SearchQuery::new("x").pages(50, 60))
            .await
            .unwrap();
        assert_eq!(outcome.items.len(), MAX_RESULTS);
        // stops paginating once the cap is reached
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn posts_filter_form_with_manual_redirect() {
        let (paginator, transport) = authenticated(vec![Reply::ok(&result_page(&[]))]).await;

        paginator
            .search(&SearchQuery::new("국회 영상").pages(1, 25))
            .await
            .unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://nanuri.ktv.go.kr/search/searchResultMain.do");
        assert_eq!(sent.redirect, RedirectMode::Manual);
        assert_eq!(sent.header_value("cookie"), Some("JSESSIONID=abc"));
        let body = sent.body.as_deref().unwrap();
        for field in [
            "cntntsTy=original",
            "category=ALL",
            "clorYn=N",
            "koglTyYn=N",
            "mediaTyYn=N",
            "dwldPosblAtYn=N",
            "pageIndex=1",
            "pageUnit=25",
            "pageSize=25",
        ] {
            assert!(body.contains(field), "missing {field} in {body}");
        }
        assert!(body.contains(&format!("baseKeyword={}", urlencoding::encode("국회 영상"))));
    }

    #[tokio::test]
    async fn redirected_post_is_followed_with_get() {
        let (paginator, transport) = authenticated(vec![
            Reply::redirect("/search/searchResultList.do").cookie("page=2"),
            Reply::ok(&result_page(&[("After redirect", "/r")])),
        ])
        .await;

        let outcome = paginator
            .search(&SearchQuery::new("x").pages(1, 10))
            .await
            .unwrap();
        assert_eq!(outcome.items[0].title, "After redirect");

        let sent = transport.requests();
        assert_eq!(sent[1].method, reqwest::Method::GET);
        assert_eq!(sent[1].url, "https://nanuri.ktv.go.kr/search/searchResultList.do");
        assert_eq!(sent[1].redirect, RedirectMode::Auto);
        assert_eq!(sent[1].header_value("cookie"), Some("JSESSIONID=abc; page=2"));
    }

    #[tokio::test]
    async fn bare_relative_redirect_stays_under_search_path() {
        let (paginator, transport) = authenticated(vec![
            Reply::redirect("searchResultList.do?pageIndex=1"),
            Reply::ok(&result_page(&[("Relative", "/rel")])),
        ])
        .await;

        paginator
            .search(&SearchQuery::new("x").pages(1, 10))
            .await
            .unwrap();
        assert_eq!(
            transport.urls()[1],
            "https://nanuri.ktv.go.kr/search/searchResultList.do?pageIndex=1"
        );
    }

    #[tokio::test]
    async fn debug_snapshot_covers_first_page_only() {
        let (paginator, _) = authenticated(vec![
            Reply::ok(&result_page(&[("A", "/1")])),
            Reply::ok("<html>login</html>"),
        ])
        .await;

        let mut query = SearchQuery::new(" news ").pages(2, 10);
        query.debug = true;
        let outcome = paginator.search(&query).await.unwrap();

        let debug = outcome.debug.unwrap();
        assert_eq!(debug.received.keyword, "news");
        assert_eq!(debug.max_pages, 2);
        assert_eq!(debug.page1.found_fn_detail, 1);
        assert!(!debug.page1.looks_like_login_page);
    }

    #[test]
    fn record_serializes_with_wire_names() {
        let record = SearchRecord {
            title: "t".into(),
            detail_reference: "/d".into(),
            thumbnail: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["detailUrl"], "/d");
        assert!(json["thumbnail"].is_null());
    }
}
