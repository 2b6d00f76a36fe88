//! Rule matching — decides whether a review is eligible for a reply.

use tracing::debug;

use crate::model::ReviewRule;

/// Evaluate a review against a rule. Pure, no side effects.
///
/// Order: rating bounds, then include keywords (at least one must occur,
/// case-insensitive substring; absent text never satisfies a non-empty
/// include set), then exclude keywords (none may occur; absent text
/// trivially passes).
pub fn review_matches(rule: &ReviewRule, rating: u8, text: Option<&str>) -> bool {
    if !(rule.min_rating..=rule.max_rating).contains(&rating) {
        debug!(
            rating,
            min = rule.min_rating,
            max = rule.max_rating,
            "Rating outside rule range"
        );
        return false;
    }

    let text_lower = text.map(str::to_lowercase);

    if !rule.keywords_include.is_empty() {
        let hit = text_lower.as_deref().is_some_and(|t| {
            rule.keywords_include
                .iter()
                .any(|kw| t.contains(&kw.to_lowercase()))
        });
        if !hit {
            debug!("Review lacks required keywords");
            return false;
        }
    }

    if !rule.keywords_exclude.is_empty()
        && let Some(t) = text_lower.as_deref()
        && rule
            .keywords_exclude
            .iter()
            .any(|kw| t.contains(&kw.to_lowercase()))
    {
        debug!("Review contains excluded keyword");
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn rule() -> ReviewRule {
        ReviewRule::new(Uuid::new_v4(), "positive-thanks")
            .with_ratings(4, 5)
            .with_include_keywords(vec!["спасибо".to_string()])
    }

    #[test]
    fn matches_keyword_case_insensitively() {
        assert!(review_matches(&rule(), 5, Some("Спасибо огромное")));
    }

    #[test]
    fn rejects_text_without_required_keyword() {
        assert!(!review_matches(&rule(), 5, Some("норм")));
    }

    #[test]
    fn rating_outside_range_never_matches() {
        assert!(!review_matches(&rule(), 3, Some("Спасибо огромное")));
        assert!(!review_matches(&rule(), 1, Some("спасибо")));
    }

    #[test]
    fn absent_text_never_satisfies_include_set() {
        assert!(!review_matches(&rule(), 5, None));
        assert!(!review_matches(&rule(), 5, Some("")));
    }

    #[test]
    fn absent_text_passes_exclude_check() {
        let rule = ReviewRule::new(Uuid::new_v4(), "no-spam")
            .with_exclude_keywords(vec!["подделка".to_string()]);
        assert!(review_matches(&rule, 3, None));
    }

    #[test]
    fn excluded_keyword_blocks_match() {
        let rule = ReviewRule::new(Uuid::new_v4(), "no-fakes")
            .with_exclude_keywords(vec!["подделка".to_string()]);
        assert!(!review_matches(&rule, 5, Some("Это ПОДДЕЛКА, не оригинал")));
        assert!(review_matches(&rule, 5, Some("Отличный оригинал")));
    }

    #[test]
    fn include_and_exclude_compose() {
        let rule = ReviewRule::new(Uuid::new_v4(), "both")
            .with_include_keywords(vec!["доставка".to_string()])
            .with_exclude_keywords(vec!["курьер".to_string()]);
        assert!(review_matches(&rule, 4, Some("Быстрая доставка")));
        assert!(!review_matches(&rule, 4, Some("Доставка ок, но курьер нагрубил")));
    }

    #[test]
    fn rule_without_keywords_matches_on_rating_alone() {
        let rule = ReviewRule::new(Uuid::new_v4(), "all");
        assert!(review_matches(&rule, 1, None));
        assert!(review_matches(&rule, 5, Some("что угодно")));
    }
}
