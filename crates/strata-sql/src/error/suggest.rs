//! Edit-distance based "did you mean" hints for relation and column names.

/// Levenshtein distance over ASCII-lowercased characters, using a single
/// rolling row.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().map(|c| c.to_ascii_lowercase()).collect();
    let b: Vec<char> = b.chars().map(|c| c.to_ascii_lowercase()).collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let substitution = diagonal + usize::from(ca != cb);
            row[j + 1] = substitution.min(above + 1).min(row[j] + 1);
            diagonal = above;
        }
    }

    row[b.len()]
}

/// Returns the candidate closest to `input` within `max_distance` edits.
///
/// Case-insensitive. Exact matches are skipped since they are not typos.
/// Ties keep the earlier candidate.
#[must_use]
pub fn closest_match<'a, S: AsRef<str>>(
    input: &str,
    candidates: &'a [S],
    max_distance: usize,
) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (c.as_ref(), edit_distance(input, c.as_ref())))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

/// `"Did you mean '...'?"` for a mistyped table name.
#[must_use]
pub fn suggest_table<S: AsRef<str>>(input: &str, available: &[S]) -> Option<String> {
    closest_match(input, available, 2).map(|m| format!("Did you mean '{m}'?"))
}
