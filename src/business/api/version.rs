//! Panel version comparison

use std::cmp::Ordering;

/// Panels older than this still expect node status reports
pub const STATUS_REPORT_BEFORE: &str = "2023.2";

/// Compare dot-separated numeric versions component by component.
///
/// Missing components count as 0 and non-numeric components parse as 0, so
/// `"2023" == "2023.0"` and `"2023.2" < "2023.10"`.
pub fn compare_version(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (x, y) => {
                let x = component(x);
                let y = component(y);
                match x.cmp(&y) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
        }
    }
}

fn component(part: Option<&str>) -> u64 {
    part.and_then(|p| p.trim().parse().ok()).unwrap_or(0)
}

/// Whether a panel of `version` needs the node to push status itself
pub fn needs_status_report(version: &str) -> bool {
    compare_version(version, STATUS_REPORT_BEFORE) == Ordering::Less
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_not_lexicographic() {
        assert_eq!(compare_version("2023.2", "2023.10"), Ordering::Less);
        assert_eq!(compare_version("2023.10", "2023.2"), Ordering::Greater);
    }

    #[test]
    fn test_missing_component_is_zero() {
        assert_eq!(compare_version("2023", "2023.0"), Ordering::Equal);
        assert_eq!(compare_version("2023.0.0", "2023"), Ordering::Equal);
        assert_eq!(compare_version("2023", "2023.1"), Ordering::Less);
    }

    #[test]
    fn test_first_difference_decides() {
        assert_eq!(compare_version("2022.12.9", "2023.1"), Ordering::Less);
        assert_eq!(compare_version("2024.1", "2023.12.31"), Ordering::Greater);
    }

    #[test]
    fn test_status_gate() {
        assert!(needs_status_report(""));
        assert!(needs_status_report("2021.11"));
        assert!(needs_status_report("2023.1.9"));
        assert!(!needs_status_report("2023.2"));
        assert!(!needs_status_report("2023.3"));
        assert!(!needs_status_report("2024"));
    }
}
