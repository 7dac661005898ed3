//! Header normalization to lowercase snake_case identifiers.

/// Apostrophes removed outright, so "Patients' rating" keeps "patients" intact
/// instead of splitting it into "patient_s".
const APOSTROPHES: [char; 3] = ['\'', '\u{2019}', '\u{2018}'];

/// Normalize a raw header into `[a-z0-9]` words joined by single underscores.
///
/// Lowercases, drops apostrophes, collapses every run of other characters into
/// one `_`, and trims separators from both ends. Total and idempotent.
///
/// # Example
/// ```
/// # use provider_ingest::normalize::normalize_column;
/// assert_eq!(
///     normalize_column("Patients’ rating of the facility linear mean score"),
///     "patients_rating_of_the_facility_linear_mean_score"
/// );
/// ```
pub fn normalize_column(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for ch in raw.chars().flat_map(char::to_lowercase) {
        if APOSTROPHES.contains(&ch) {
            continue;
        }
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(ch);
        } else {
            pending_separator = true;
        }
    }
    out
}

/// Normalize a full header row. Collisions are left in place; the returned
/// list names each duplicated output once, in first-seen order.
pub fn normalize_headers<'a, I>(raw: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = &'a str>,
{
    let headers: Vec<String> = raw.into_iter().map(normalize_column).collect();
    let mut duplicates = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        if headers[..i].contains(header) && !duplicates.contains(header) {
            duplicates.push(header.clone());
        }
    }
    (headers, duplicates)
}
