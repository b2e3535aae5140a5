//! Relevance scoring of records against search terms.

use super::MarketplaceRecord;

const TITLE_WEIGHT: f64 = 10.0;
const SUBTITLE_WEIGHT: f64 = 5.0;
const TAG_WEIGHT: f64 = 8.0;
const USABILITY_WEIGHT: f64 = 2.0;
const MAX_VOTE_BONUS: f64 = 5.0;
const MAX_DOWNLOAD_BONUS: f64 = 3.0;

/// Scores `record` against `terms`. Higher is more relevant.
///
/// Term matches are case-insensitive substring matches: +10 for the title,
/// +5 for the subtitle, +8 per matching tag. Popularity adds
/// `usability × 2`, up to 5 for votes (one per hundred) and up to 3 for
/// downloads (one per thousand).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn relevance(record: &MarketplaceRecord, terms: &[String]) -> f64 {
    let title = record.title.to_lowercase();
    let subtitle = record.subtitle.as_deref().unwrap_or_default().to_lowercase();
    let tags: Vec<String> = record.tags.iter().map(|tag| tag.to_lowercase()).collect();

    let mut score = 0.0;
    for term in terms {
        let term = term.to_lowercase();
        if term.is_empty() {
            continue;
        }
        if title.contains(&term) {
            score += TITLE_WEIGHT;
        }
        if subtitle.contains(&term) {
            score += SUBTITLE_WEIGHT;
        }
        score += TAG_WEIGHT * tags.iter().filter(|tag| tag.contains(&term)).count() as f64;
    }

    score += record.usability_rating.unwrap_or(0.0) * USABILITY_WEIGHT;
    score += (record.vote_count.unwrap_or(0) as f64 / 100.0).min(MAX_VOTE_BONUS);
    score += (record.download_count.unwrap_or(0) as f64 / 1000.0).min(MAX_DOWNLOAD_BONUS);
    score
}

/// Sorts records by descending relevance. Ties keep their order.
pub fn rank_by_relevance(records: &mut [MarketplaceRecord], terms: &[String]) {
    records.sort_by_cached_key(|record| std::cmp::Reverse(OrderedScore(relevance(record, terms))));
}

/// Total order over scores; NaN sorts lowest.
#[derive(PartialEq)]
struct OrderedScore(f64);

impl Eq for OrderedScore {}

impl PartialOrd for OrderedScore {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedScore {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}
