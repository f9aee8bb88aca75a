use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{ExtractedPage, RecordExtractor};
use crate::error::UpstreamFetchError;
use crate::models::RawRecord;

/// Upper bound the store endpoint honours for `num_per_page`.
pub const STEAM_MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
struct ReviewsDocument {
    success: i64,
    #[serde(default)]
    reviews: Vec<SteamReview>,
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct SteamReview {
    #[serde(default)]
    review: String,
    #[serde(default)]
    voted_up: bool,
    timestamp_created: i64,
    author: SteamAuthor,
}

#[derive(Deserialize)]
struct SteamAuthor {
    #[serde(default)]
    playtime_forever: u64,
    playtime_at_review: Option<u64>,
}

/// Decodes the store's `appreviews` JSON document.
#[derive(Debug, Default, Clone)]
pub struct SteamReviewExtractor;

impl RecordExtractor for SteamReviewExtractor {
    fn extract(&self, document: &str) -> Result<ExtractedPage, UpstreamFetchError> {
        let doc: ReviewsDocument = serde_json::from_str(document)
            .map_err(|e| UpstreamFetchError::Decode(e.to_string()))?;
        if doc.success != 1 {
            return Err(UpstreamFetchError::Protocol(format!(
                "upstream reported success={}",
                doc.success
            )));
        }

        let records = doc
            .reviews
            .into_iter()
            .map(|r| {
                let minutes = r.author.playtime_at_review.unwrap_or(r.author.playtime_forever);
                Ok(RawRecord {
                    text: r.review,
                    numeric_metric: minutes_to_hours(minutes),
                    recommended: r.voted_up,
                    timestamp: unix_to_utc(r.timestamp_created)?,
                })
            })
            .collect::<Result<Vec<_>, UpstreamFetchError>>()?;

        Ok(ExtractedPage {
            records,
            next_cursor: doc.cursor,
        })
    }
}

fn minutes_to_hours(minutes: u64) -> f64 {
    (minutes as f64 / 60.0 * 10.0).round() / 10.0
}

fn unix_to_utc(secs: i64) -> Result<DateTime<Utc>, UpstreamFetchError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| UpstreamFetchError::Decode(format!("invalid timestamp {}", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.json", name)).unwrap()
    }

    #[test]
    fn decodes_review_page() {
        let page = SteamReviewExtractor.extract(&fixture("steam_page")).unwrap();
        assert_eq!(page.records.len(), 3);
        assert_eq!(page.next_cursor.as_deref(), Some("AoJwlK/Q2IwDeOeY9gQ="));

        let first = &page.records[0];
        assert!(first.recommended);
        assert_eq!(first.numeric_metric, 20.5);
        assert_eq!(first.timestamp.to_rfc3339(), "2024-01-15T10:40:00+00:00");
        assert!(first.text.starts_with("Fantastic roguelike"));

        assert!(!page.records[1].recommended);
        // falls back to playtime_forever
        assert_eq!(page.records[2].numeric_metric, 1.0);
    }

    #[test]
    fn empty_page_is_not_an_error() {
        let page = SteamReviewExtractor.extract(&fixture("steam_empty")).unwrap();
        assert!(page.records.is_empty());
    }

    #[test]
    fn unsuccessful_document_is_protocol_error() {
        let err = SteamReviewExtractor
            .extract(r#"{"success": 2}"#)
            .unwrap_err();
        assert!(matches!(err, UpstreamFetchError::Protocol(_)));
    }

    #[test]
    fn garbage_is_decode_error() {
        let err = SteamReviewExtractor.extract("<html>busy</html>").unwrap_err();
        assert!(matches!(err, UpstreamFetchError::Decode(_)));
    }

    #[test]
    fn hours_rounded_to_one_decimal() {
        assert_eq!(minutes_to_hours(0), 0.0);
        assert_eq!(minutes_to_hours(90), 1.5);
        assert_eq!(minutes_to_hours(100), 1.7);
    }
}
