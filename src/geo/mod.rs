//! City-name geography. There is no geocoding; two places match when their
//! names are close enough.

const EXACT_CITY_SCORE: f64 = 0.5;
const PREFIX_CITY_SCORE: f64 = 0.3;
const PREFIX_LEN: usize = 3;

fn normalize(city: &str) -> String {
    city.trim().to_lowercase()
}

fn prefix(city: &str) -> String {
    city.chars().take(PREFIX_LEN).collect()
}

/// Contribution of one endpoint to the geographic sub-score.
pub fn city_score(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    if a.contains(&b) || b.contains(&a) {
        EXACT_CITY_SCORE
    } else if a.chars().count() >= PREFIX_LEN && prefix(&a) == prefix(&b) {
        PREFIX_CITY_SCORE
    } else {
        0.0
    }
}

pub fn route_score(
    origin_a: &str,
    destination_a: &str,
    origin_b: &str,
    destination_b: &str,
) -> f64 {
    (city_score(origin_a, origin_b) + city_score(destination_a, destination_b)).min(1.0)
}

/// Candidate filter: `listed` contains `wanted`, or its first three
/// characters when `wanted` is longer than three.
pub fn city_matches(listed: &str, wanted: &str) -> bool {
    let listed = normalize(listed);
    let wanted = normalize(wanted);
    if wanted.is_empty() {
        return true;
    }

    listed.contains(&wanted)
        || (wanted.chars().count() > PREFIX_LEN && listed.contains(&prefix(&wanted)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_city_scores_half() {
        assert_eq!(city_score("Alger", "alger"), 0.5);
        assert_eq!(city_score("Paris", "Paris 11e"), 0.5);
    }

    #[test]
    fn shared_prefix_scores_less() {
        assert_eq!(city_score("Constantine", "Constance"), 0.3);
    }

    #[test]
    fn unrelated_cities_score_zero() {
        assert_eq!(city_score("Oran", "Lyon"), 0.0);
        assert_eq!(city_score("", "Lyon"), 0.0);
    }

    #[test]
    fn full_route_caps_at_one() {
        assert_eq!(route_score("Alger", "Paris", "alger", "paris"), 1.0);
        assert_eq!(route_score("Alger", "Paris", "alger", "Lyon"), 0.5);
    }

    #[test]
    fn filter_accepts_prefix_for_longer_names() {
        assert!(city_matches("Marseille", "marseille"));
        assert!(city_matches("Marseille Saint-Charles", "Marsa"));
        assert!(!city_matches("Lyon", "Marseille"));
        assert!(!city_matches("Orly", "Ora"));
    }
}
