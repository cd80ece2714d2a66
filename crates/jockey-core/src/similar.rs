//! Near-duplicate suppression between track titles.

/// Normalized similarity in [0, 1] between two titles, lowercased, with the
/// forced keyword (if any) stripped from both sides first so the keyword
/// itself cannot inflate the ratio.
pub fn similarity(a: &str, b: &str, forced_keyword: Option<&str>) -> f64 {
    let mut a = a.to_lowercase();
    let mut b = b.to_lowercase();
    if let Some(kw) = forced_keyword {
        let kw = kw.to_lowercase();
        if !kw.is_empty() {
            a = a.replace(&kw, "").trim().to_string();
            b = b.replace(&kw, "").trim().to_string();
        }
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// True iff the similarity ratio exceeds `threshold`. Either title being
/// empty short-circuits to false: no similarity claim without data.
pub fn too_similar(a: &str, b: &str, forced_keyword: Option<&str>, threshold: f64) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    similarity(a, b, forced_keyword) > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_titles() {
        assert!(too_similar("Band - Song", "band - song", None, 0.85));
    }

    #[test]
    fn test_distinct_titles() {
        assert!(!too_similar(
            "Aphex Twin - Windowlicker",
            "Burial - Archangel",
            None,
            0.45
        ));
    }

    #[test]
    fn test_empty_short_circuits() {
        assert!(!too_similar("", "anything", None, 0.1));
        assert!(!too_similar("anything", "", None, 0.1));
    }

    #[test]
    fn test_forced_keyword_stripped() {
        // With the shared keyword left in, these would compare as similar.
        let a = "metrika - sunrise";
        let b = "metrika - downtown";
        let with = similarity(a, b, None);
        let without = similarity(a, b, Some("metrika"));
        assert!(without < with);
        assert!(!too_similar(a, b, Some("metrika"), 0.85));
    }

    #[test]
    fn test_threshold_is_a_parameter() {
        let a = "Band - Song (Official Video)";
        let b = "Band - Song (Lyric Video)";
        let ratio = similarity(a, b, None);
        assert!(too_similar(a, b, None, ratio - 0.01));
        assert!(!too_similar(a, b, None, ratio + 0.01));
    }
}
