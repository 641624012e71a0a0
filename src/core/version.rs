//! Version ordering for plugin-declared version strings.
//!
//! Registry versions are free-form ("1.2", "2.0.0-beta1", "20240101"), so the
//! ordering splits on separators and compares segment by segment: numerically
//! when both segments are numbers, lexicographically otherwise.

use std::cmp::Ordering;

fn segments(version: &str) -> impl Iterator<Item = &str> {
    version.split(['.', '-', '_', '+']).filter(|s| !s.is_empty())
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        // A numeric segment sorts after a textual one ("1.0" > "1.beta")
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Order of a version with one more segment than an otherwise equal version.
///
/// A numeric extra segment is a later release (`1.0.1 > 1.0`), a textual one
/// is a pre-release (`2.0-beta < 2.0`).
fn trailing_segment(extra: &str) -> Ordering {
    if extra.parse::<u64>().is_ok() {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

/// Compare two version strings.
///
/// A missing trailing segment sorts before a numeric one (`1.0 < 1.0.1`)
/// and after a textual one (`2.0-beta < 2.0`). Ties between
/// different spellings (`1.0` vs `1.00`) fall back to plain string order to
/// keep the ordering total.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = segments(a);
    let mut right = segments(b);

    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) => match compare_segment(x, y) {
                Ordering::Equal => continue,
                other => return other,
            },
            (Some(x), None) => return trailing_segment(x),
            (None, Some(y)) => return trailing_segment(y).reverse(),
            (None, None) => return a.cmp(b),
        }
    }
}

/// Pick the greatest version out of a set.
pub fn latest_version<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions.into_iter().max_by(|a, b| compare_versions(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_segments() {
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "10.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn test_missing_segments_sort_first() {
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("3", "2.9.9"), Ordering::Greater);
    }

    #[test]
    fn test_pre_release_sorts_before_release() {
        assert_eq!(compare_versions("2.0-beta", "2.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0", "2.0-rc1"), Ordering::Greater);
        assert_eq!(compare_versions("2.0.0-beta1", "2.0.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0-beta", "1.9"), Ordering::Greater);
        assert_eq!(latest_version(["2.0-beta", "2.0", "1.9"]), Some("2.0"));
    }

    #[test]
    fn test_textual_segments() {
        assert_eq!(compare_versions("1.0-beta", "1.0-alpha"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0", "1.0.beta"), Ordering::Greater);
    }

    #[test]
    fn test_latest_version() {
        let versions = ["1.9", "1.10", "1.2.3", "trunk"];
        assert_eq!(latest_version(versions), Some("1.10"));
        assert_eq!(latest_version(Vec::<&str>::new()), None);
    }

    #[test]
    fn test_lexicographic_order_would_be_wrong() {
        // Plain string sorting puts "9.0" above "10.0"
        assert_eq!(latest_version(["9.0", "10.0"]), Some("10.0"));
    }
}
