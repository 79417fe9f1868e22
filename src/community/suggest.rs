//! Close-name suggestions for failed claims.

/// Suggestions offered after a failed lookup.
pub const MAX_SUGGESTIONS: usize = 3;

/// Up to `limit` candidates closest to `query` by case-insensitive
/// Levenshtein distance. Ties keep candidate order.
pub fn suggest(query: &str, candidates: &[String], limit: usize) -> Vec<String> {
    let query = query.to_lowercase();

    let mut scored: Vec<(usize, &String)> = candidates
        .iter()
        .filter(|name| !name.is_empty())
        .map(|name| (strsim::levenshtein(&query, &name.to_lowercase()), name))
        .collect();
    scored.sort_by_key(|(distance, _)| *distance);

    let mut suggestions: Vec<String> = Vec::with_capacity(limit);
    for (_, name) in scored {
        if suggestions.len() == limit {
            break;
        }
        if !suggestions.contains(name) {
            suggestions.push(name.clone());
        }
    }
    suggestions
}
