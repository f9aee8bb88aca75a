use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::steam::{SteamReviewExtractor, STEAM_MAX_PAGE_SIZE};
use super::{RecordExtractor, SourcePager};
use crate::config::Settings;
use crate::error::UpstreamFetchError;
use crate::models::RawRecord;

const START_CURSOR: &str = "*";

/// Pages an HTTP endpoint that paginates by opaque cursor, exposing it as
/// sequential offsets. Document decoding is delegated to the extractor.
pub struct HttpPager<E> {
    client: Client,
    endpoint_template: String,
    static_query: Vec<(&'static str, String)>,
    page_size_param: &'static str,
    cursor_param: &'static str,
    max_page_size: usize,
    extractor: E,
    // target id -> (offset the cursor resumes at, cursor)
    cursors: HashMap<String, (usize, String)>,
}

impl HttpPager<SteamReviewExtractor> {
    /// Pager for the store's review endpoint.
    pub fn steam(settings: &Settings) -> Result<Self, UpstreamFetchError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(HttpPager {
            client,
            endpoint_template: format!(
                "{}/appreviews/{{target}}",
                settings.base_url.trim_end_matches('/')
            ),
            static_query: vec![
                ("json", "1".to_string()),
                ("filter", "recent".to_string()),
                ("language", settings.language.clone()),
                ("purchase_type", "all".to_string()),
            ],
            page_size_param: "num_per_page",
            cursor_param: "cursor",
            max_page_size: STEAM_MAX_PAGE_SIZE,
            extractor: SteamReviewExtractor,
            cursors: HashMap::new(),
        })
    }
}

impl<E: RecordExtractor> HttpPager<E> {
    fn url_for(&self, target_id: &str) -> String {
        self.endpoint_template.replace("{target}", target_id)
    }

    fn cursor_for(&self, target_id: &str, offset: usize) -> Result<String, UpstreamFetchError> {
        if offset == 0 {
            return Ok(START_CURSOR.to_string());
        }
        match self.cursors.get(target_id) {
            Some((at, cursor)) if *at == offset => Ok(cursor.clone()),
            Some((at, _)) => Err(UpstreamFetchError::Protocol(format!(
                "offset {} requested for {} but pagination resumes at {}",
                offset, target_id, at
            ))),
            None => Err(UpstreamFetchError::Protocol(format!(
                "offset {} requested for {} before the first page",
                offset, target_id
            ))),
        }
    }
}

#[async_trait]
impl<E: RecordExtractor> SourcePager for HttpPager<E> {
    async fn fetch(
        &mut self,
        target_id: &str,
        offset: usize,
        batch_size: usize,
    ) -> Result<Vec<RawRecord>, UpstreamFetchError> {
        let cursor = self.cursor_for(target_id, offset)?;
        let url = self.url_for(target_id);
        let page_size = batch_size.clamp(1, self.max_page_size);

        let mut query = self.static_query.clone();
        query.push((self.page_size_param, page_size.to_string()));
        query.push((self.cursor_param, cursor));

        let start = Instant::now();
        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamFetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let body = response.text().await?;
        debug!(
            "Fetched {} (offset {}, {} bytes) in {}ms",
            target_id,
            offset,
            body.len(),
            start.elapsed().as_millis()
        );

        let page = self.extractor.extract(&body)?;
        let mut records = page.records;
        // the stored cursor must resume exactly where the returned records end
        records.truncate(page_size);
        if let Some(next) = page.next_cursor {
            self.cursors
                .insert(target_id.to_string(), (offset + records.len(), next));
        }
        if records.is_empty() {
            info!("Upstream exhausted for {} at offset {}", target_id, offset);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{collect_target, CollectionPlan};
    use crate::dedup::DedupIndex;
    use crate::models::CollectionTarget;
    use crate::stats::TargetOutcome;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PAGE_CURSOR: &str = "AoJwlK/Q2IwDeOeY9gQ=";

    fn pager_at(base_url: &str) -> HttpPager<SteamReviewExtractor> {
        let settings = Settings {
            base_url: base_url.to_string(),
            request_timeout_secs: 5,
            ..Settings::default()
        };
        HttpPager::steam(&settings).unwrap()
    }

    fn pager() -> HttpPager<SteamReviewExtractor> {
        pager_at("https://store.example.test/")
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.json", name)).unwrap()
    }

    /// Answers one connection per canned response, in order. Returns the base
    /// url and the request lines received so far.
    async fn serve(responses: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&chunk[..n]);
                }
                let request_line = String::from_utf8_lossy(&head)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                log.lock().unwrap().push(request_line);

                let reply = format!(
                    "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), requests)
    }

    #[test]
    fn endpoint_is_built_from_base_url() {
        let p = pager();
        assert_eq!(
            p.url_for("1687950"),
            "https://store.example.test/appreviews/1687950"
        );
    }

    #[test]
    fn first_page_starts_at_wildcard_cursor() {
        let p = pager();
        assert_eq!(p.cursor_for("1687950", 0).unwrap(), "*");
    }

    #[test]
    fn later_pages_need_a_remembered_cursor() {
        let mut p = pager();
        assert!(matches!(
            p.cursor_for("1687950", 20),
            Err(UpstreamFetchError::Protocol(_))
        ));

        p.cursors
            .insert("1687950".to_string(), (20, "AoJwlK".to_string()));
        assert_eq!(p.cursor_for("1687950", 20).unwrap(), "AoJwlK");
        assert!(p.cursor_for("1687950", 40).is_err());
        // other targets are independent
        assert_eq!(p.cursor_for("2345678", 0).unwrap(), "*");
    }

    #[tokio::test]
    async fn fetch_resumes_from_returned_cursor() {
        let (base, requests) =
            serve(vec![(200, fixture("steam_page")), (200, fixture("steam_empty"))]).await;
        let mut p = pager_at(&base);

        let first = p.fetch("1687950", 0, 10).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(
            p.cursors.get("1687950"),
            Some(&(3, PAGE_CURSOR.to_string()))
        );

        let second = p.fetch("1687950", 3, 7).await.unwrap();
        assert!(second.is_empty());

        let lines = requests.lock().unwrap().clone();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("GET /appreviews/1687950?"));
        assert!(lines[0].contains("cursor=*"));
        assert!(lines[0].contains("num_per_page=10"));
        assert!(lines[0].contains("json=1"));
        assert!(lines[1].contains("cursor=AoJwlK%2FQ2IwDeOeY9gQ%3D"));
        assert!(lines[1].contains("num_per_page=7"));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let (base, _) = serve(vec![(502, String::new())]).await;
        let mut p = pager_at(&base);

        let err = p.fetch("1687950", 0, 10).await.unwrap_err();

        match err {
            UpstreamFetchError::Status { status, url } => {
                assert_eq!(status, 502);
                assert!(url.ends_with("/appreviews/1687950"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
        assert!(p.cursors.is_empty());
    }

    #[tokio::test]
    async fn oversized_page_is_cut_before_cursor_is_kept() {
        let (base, _) = serve(vec![(200, fixture("steam_page"))]).await;
        let mut p = pager_at(&base);

        let records = p.fetch("1687950", 0, 2).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            p.cursors.get("1687950"),
            Some(&(2, PAGE_CURSOR.to_string()))
        );
        assert_eq!(p.cursor_for("1687950", 2).unwrap(), PAGE_CURSOR);
    }

    #[tokio::test]
    async fn empty_page_ends_the_target() {
        let (base, requests) =
            serve(vec![(200, fixture("steam_page")), (200, fixture("steam_empty"))]).await;
        let mut p = pager_at(&base);
        let target = CollectionTarget::new("1687950", "Game 1");
        let mut dedup = DedupIndex::new();

        let y = collect_target(&mut p, &target, &CollectionPlan::new(10), 1.0, &mut dedup).await;

        assert_eq!(y.stats.outcome, TargetOutcome::Exhausted);
        assert_eq!(y.stats.fetched, 3);
        assert!(y.stats.error.is_none());
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unsuccessful_document_fails_the_target() {
        let (base, _) = serve(vec![(200, r#"{"success": 2}"#.to_string())]).await;
        let mut p = pager_at(&base);
        let target = CollectionTarget::new("1687950", "Game 1");
        let mut dedup = DedupIndex::new();

        let y = collect_target(&mut p, &target, &CollectionPlan::new(10), 0.5, &mut dedup).await;

        assert_eq!(y.stats.outcome, TargetOutcome::FetchFailed);
        assert!(y.records.is_empty());
        assert!(y
            .stats
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("success=2"));
    }
}
