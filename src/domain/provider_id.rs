//! Tolerant provider-id resolution.
//!
//! Stored sessions and configuration do not always agree on id formatting:
//! a session may carry `pp_razorpay_razorpay` or `razorpay:live` where the
//! registered adapter is just `razorpay`.

/// Candidate forms of `id`, longest first.
pub fn candidate_ids(id: &str) -> Vec<String> {
    let full = id.trim().to_lowercase();
    let mut out = vec![full.clone()];

    let stripped = full.strip_prefix("pp_").unwrap_or(&full).to_string();
    let parts: Vec<&str> = stripped
        .split(|c| c == '_' || c == ':' || c == '/')
        .filter(|p| !p.is_empty())
        .collect();
    out.push(stripped.clone());

    for len in (1..parts.len()).rev() {
        out.push(parts[..len].join("_"));
        out.push(parts[parts.len() - len..].join("_"));
    }

    let mut seen = std::collections::HashSet::new();
    out.retain(|c| !c.is_empty() && seen.insert(c.clone()));
    out
}

/// Exact match over the candidate forms, then a substring match over the
/// fixed list of known ids.
pub fn resolve_provider_id<'a>(requested: &str, known: &[&'a str]) -> Option<&'a str> {
    for candidate in candidate_ids(requested) {
        if let Some(found) = known.iter().find(|k| k.eq_ignore_ascii_case(&candidate)) {
            return Some(*found);
        }
    }

    let lowered = requested.to_lowercase();
    known
        .iter()
        .find(|k| !k.is_empty() && lowered.contains(&k.to_lowercase()))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &[&str] = &["razorpay", "mock"];

    #[test]
    fn exact_id_wins() {
        assert_eq!(resolve_provider_id("razorpay", KNOWN), Some("razorpay"));
        assert_eq!(resolve_provider_id("RazorPay", KNOWN), Some("razorpay"));
    }

    #[test]
    fn namespaced_ids_shrink_to_known_id() {
        assert_eq!(resolve_provider_id("pp_razorpay_razorpay", KNOWN), Some("razorpay"));
        assert_eq!(resolve_provider_id("razorpay:live", KNOWN), Some("razorpay"));
        assert_eq!(resolve_provider_id("pp_mock", KNOWN), Some("mock"));
    }

    #[test]
    fn substring_fallback() {
        assert_eq!(resolve_provider_id("acme-razorpay-wrapper", KNOWN), Some("razorpay"));
    }

    #[test]
    fn unknown_id_is_none() {
        assert_eq!(resolve_provider_id("stripe", KNOWN), None);
    }

    #[test]
    fn candidates_are_longest_first_and_unique() {
        let c = candidate_ids("pp_razorpay_live");
        assert_eq!(c[0], "pp_razorpay_live");
        assert_eq!(c[1], "razorpay_live");
        assert!(c.contains(&"razorpay".to_string()));
        let unique: std::collections::HashSet<_> = c.iter().collect();
        assert_eq!(unique.len(), c.len());
    }
}
