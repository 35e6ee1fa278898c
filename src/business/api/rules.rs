//! Detect rules: local file rules merged with the panel's rule list

use regex::Regex;
use std::path::Path;

use super::models::RuleItem;
use crate::logger::log;

/// Identifier of rules loaded from the local file
pub const LOCAL_RULE_ID: i64 = -1;

/// A content pattern that marks a request as illegal
#[derive(Debug, Clone)]
pub struct DetectRule {
    pub id: i64,
    pub pattern: Regex,
}

impl DetectRule {
    pub fn is_match(&self, target: &str) -> bool {
        self.pattern.is_match(target)
    }
}

impl PartialEq for DetectRule {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.pattern.as_str() == other.pattern.as_str()
    }
}

/// Compile one pattern per non-empty line. Lines that do not compile are skipped.
pub fn parse_local_rules(content: &str) -> Vec<DetectRule> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match Regex::new(line) {
            Ok(pattern) => Some(DetectRule {
                id: LOCAL_RULE_ID,
                pattern,
            }),
            Err(e) => {
                log::skipped_record("local_rule", line, &e.to_string());
                None
            }
        })
        .collect()
}

/// Load the local rule file. A missing or unreadable file yields no rules.
pub fn load_local_rules(path: Option<&Path>) -> Vec<DetectRule> {
    let Some(path) = path else {
        return Vec::new();
    };

    match std::fs::read_to_string(path) {
        Ok(content) => {
            let rules = parse_local_rules(&content);
            log::info!(path = %path.display(), count = rules.len(), "Local detect rules loaded");
            rules
        }
        Err(e) => {
            log::warn!(path = %path.display(), error = %e, "Failed to read local rule file");
            Vec::new()
        }
    }
}

/// Local rules first, then every remote rule that compiles. No deduplication.
pub fn merge_rules(local: &[DetectRule], remote: Vec<RuleItem>) -> Vec<DetectRule> {
    let mut rules = Vec::with_capacity(local.len() + remote.len());
    rules.extend_from_slice(local);

    for item in remote {
        match Regex::new(&item.content) {
            Ok(pattern) => rules.push(DetectRule {
                id: item.id,
                pattern,
            }),
            Err(e) => log::skipped_record("rule", &item.id.to_string(), &e.to_string()),
        }
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn item(id: i64, content: &str) -> RuleItem {
        RuleItem {
            id,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_parse_local_rules() {
        let rules = parse_local_rules("(.*\\.|)google\\.com\n\n  speedtest  \n(unclosed\n");
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.id == LOCAL_RULE_ID));
        assert!(rules[0].is_match("www.google.com"));
        assert!(rules[1].is_match("speedtest.net"));
    }

    #[test]
    fn test_load_local_rules_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bittorrent").unwrap();
        writeln!(file, "^torrent\\.").unwrap();

        let rules = load_local_rules(Some(file.path()));
        assert_eq!(rules.len(), 2);
        assert!(rules[1].is_match("torrent.example"));
    }

    #[test]
    fn test_load_local_rules_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let rules = load_local_rules(Some(&dir.path().join("missing.txt")));
        assert!(rules.is_empty());
        assert!(load_local_rules(None).is_empty());
    }

    #[test]
    fn test_merge_local_first() {
        let local = parse_local_rules("local-a\nlocal-b");
        let merged = merge_rules(&local, vec![item(10, "remote-a"), item(11, "remote-b")]);

        let ids: Vec<i64> = merged.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![-1, -1, 10, 11]);
    }

    #[test]
    fn test_merge_is_fresh_each_call() {
        let local = parse_local_rules("local");
        let first = merge_rules(&local, vec![item(1, "a")]);
        let second = merge_rules(&local, vec![item(1, "a"), item(2, "b")]);
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn test_merge_skips_bad_remote_pattern() {
        let merged = merge_rules(&[], vec![item(1, "[bad"), item(2, "good")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, 2);
    }

    #[test]
    fn test_merge_keeps_duplicates() {
        let local = parse_local_rules("dup");
        let merged = merge_rules(&local, vec![item(3, "dup")]);
        assert_eq!(merged.len(), 2);
    }
}
