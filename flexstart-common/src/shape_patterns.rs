/// Shape-id exclusion patterns.
///
/// We keep this intentionally small: exact ids plus `*` wildcard support
/// (case-insensitive). No other glob features.

/// Return true if `shape_id` matches at least one pattern.
///
/// Pattern rules:
/// - Case-insensitive
/// - `*` matches any substring (including empty)
pub fn shape_matches_patterns(shape_id: &str, patterns: &[String]) -> bool {
    let id = shape_id.trim().to_ascii_lowercase();
    if id.is_empty() {
        return false;
    }

    for pat in patterns {
        let p = pat.trim().to_ascii_lowercase();
        if p.is_empty() {
            continue;
        }
        if p == "*" {
            return true;
        }
        if !p.contains('*') {
            if id == p {
                return true;
            }
            continue;
        }
        if wildcard_match(&id, &p) {
            return true;
        }
    }

    false
}

fn wildcard_match(text: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    // Anchored prefix and suffix; middle parts must appear in order.
    let mut rest = text;
    if let Some(first) = parts.first() {
        if !first.is_empty() {
            if !rest.starts_with(first) {
                return false;
            }
            rest = &rest[first.len()..];
        }
    }
    if let Some(last) = parts.last() {
        if parts.len() > 1 && !last.is_empty() {
            if !rest.ends_with(last) {
                return false;
            }
            rest = &rest[..rest.len() - last.len()];
        }
    }
    for mid in &parts[1..parts.len().saturating_sub(1)] {
        if mid.is_empty() {
            continue;
        }
        match rest.find(mid) {
            Some(pos) => rest = &rest[pos + mid.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pats(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        assert!(shape_matches_patterns("t2.xlarge", &pats(&["T2.XLARGE"])));
        assert!(!shape_matches_patterns("t2.xlarge", &pats(&["t2.large"])));
    }

    #[test]
    fn wildcard_families() {
        let p = pats(&["t2.*"]);
        assert!(shape_matches_patterns("t2.xlarge", &p));
        assert!(shape_matches_patterns("t2.nano", &p));
        assert!(!shape_matches_patterns("t3.xlarge", &p));

        let p = pats(&["*.metal"]);
        assert!(shape_matches_patterns("m5.metal", &p));
        assert!(!shape_matches_patterns("m5.large", &p));
    }

    #[test]
    fn star_matches_everything_and_empty_list_nothing() {
        assert!(shape_matches_patterns("anything", &pats(&["*"])));
        assert!(!shape_matches_patterns("anything", &[]));
        assert!(!shape_matches_patterns("", &pats(&["*"])));
    }
}
