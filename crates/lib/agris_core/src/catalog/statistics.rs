//! Rating aggregates.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::models::catalog::{DistributionPoint, RatingStatistics, RatingSummary, StarDetail};

/// Truncate (not round) to two decimals.
pub fn truncate2(x: f64) -> f64 {
    (x * 100.0).trunc() / 100.0
}

/// Build a product's rating statistics from live-rating counts, where
/// `counts[0]` is the number of 1-star ratings and `counts[4]` 5-star.
pub fn summarize_ratings(product_id: Uuid, counts: [i64; 5]) -> RatingStatistics {
    let total: i64 = counts.iter().sum();
    if total == 0 {
        return RatingStatistics {
            product_id,
            summary: RatingSummary {
                avg_rating: 0.0,
                total_ratings: 0,
            },
            distribution: BTreeMap::new(),
            distribution_chart: Vec::new(),
        };
    }

    let weighted: i64 = counts
        .iter()
        .zip(1..)
        .map(|(count, stars)| count * stars)
        .sum();
    let avg_rating = truncate2(weighted as f64 / total as f64);

    let mut distribution = BTreeMap::new();
    let mut distribution_chart = Vec::with_capacity(5);
    for stars in (1..=5).rev() {
        let count = counts[(stars - 1) as usize];
        let percentage = truncate2(count as f64 / total as f64 * 100.0);
        distribution.insert(stars.to_string(), StarDetail { count, percentage });
        distribution_chart.push(DistributionPoint {
            stars,
            count,
            percentage,
        });
    }

    RatingStatistics {
        product_id,
        summary: RatingSummary {
            avg_rating,
            total_ratings: total,
        },
        distribution,
        distribution_chart,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_ratings_yields_empty_distribution() {
        let stats = summarize_ratings(Uuid::nil(), [0; 5]);
        assert_eq!(stats.summary.total_ratings, 0);
        assert_eq!(stats.summary.avg_rating, 0.0);
        assert!(stats.distribution.is_empty());
        assert!(stats.distribution_chart.is_empty());
    }

    #[test]
    fn average_and_percentages_are_truncated() {
        // 1x5, 1x4, 1x4 => avg 4.333.., 5-star 33.33%, 4-star 66.66%
        let stats = summarize_ratings(Uuid::nil(), [0, 0, 0, 2, 1]);
        assert_eq!(stats.summary.avg_rating, 4.33);
        assert_eq!(stats.summary.total_ratings, 3);
        assert_eq!(stats.distribution["5"].percentage, 33.33);
        assert_eq!(stats.distribution["4"].percentage, 66.66);
        assert_eq!(stats.distribution["1"].count, 0);
    }

    #[test]
    fn chart_runs_from_five_stars_down() {
        let stats = summarize_ratings(Uuid::nil(), [1, 1, 1, 1, 1]);
        let stars: Vec<i32> = stats.distribution_chart.iter().map(|p| p.stars).collect();
        assert_eq!(stars, vec![5, 4, 3, 2, 1]);
        assert_eq!(stats.summary.avg_rating, 3.0);
        assert!(stats.distribution_chart.iter().all(|p| p.percentage == 20.0));
    }
}
