//! TTL policy: given a path, status and content type, decide how long a response may be
//! cached. Precedence, highest first: path glob, status code, content type, default.

use std::collections::HashMap;

use globset::{Glob, GlobMatcher};

use crate::config::{Config, PathTtlRule};

struct CompiledPathRule {
    matcher: GlobMatcher,
    ttl_seconds: u64,
}

pub struct TtlPolicy {
    path_rules: Vec<CompiledPathRule>,
    status_rules: HashMap<u16, u64>,
    content_type_rules: HashMap<String, u64>,
    default_ttl: u64,
}

impl TtlPolicy {
    /// Compiles the glob rules once at construction; invalid globs are dropped with a warning
    /// rather than failing startup, since a malformed pattern degrading to "no override" is
    /// preferable to refusing to serve traffic.
    pub fn from_config(config: &Config) -> Self {
        let path_rules = config
            .ttl_by_path_pattern
            .iter()
            .filter_map(|rule: &PathTtlRule| match Glob::new(&rule.glob) {
                Ok(glob) => Some(CompiledPathRule {
                    matcher: glob.compile_matcher(),
                    ttl_seconds: rule.ttl_seconds,
                }),
                Err(err) => {
                    tracing::warn!(glob = %rule.glob, error = %err, "skipping invalid TTL path glob");
                    None
                }
            })
            .collect();

        Self {
            path_rules,
            status_rules: config.ttl_by_status_code.clone(),
            content_type_rules: config.ttl_by_content_type.clone(),
            default_ttl: config.cache_default_ttl,
        }
    }

    pub fn resolve(&self, path: &str, status: u16, content_type: &str) -> u64 {
        if let Some(rule) = self.path_rules.iter().find(|r| r.matcher.is_match(path)) {
            return rule.ttl_seconds;
        }
        if let Some(ttl) = self.status_rules.get(&status) {
            return *ttl;
        }
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_lowercase();
        if let Some(ttl) = self.content_type_rules.get(&media_type) {
            return *ttl;
        }
        self.default_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> TtlPolicy {
        let mut config = Config::from_env().unwrap();
        config.ttl_by_path_pattern = vec![PathTtlRule {
            glob: "/static/*".to_string(),
            ttl_seconds: 600,
        }];
        config.ttl_by_status_code = HashMap::from([(200, 5), (404, 10)]);
        config.ttl_by_content_type = HashMap::from([("application/json".to_string(), 30)]);
        config.cache_default_ttl = 15;
        TtlPolicy::from_config(&config)
    }

    #[test]
    fn path_rule_wins_over_everything_else() {
        let p = policy();
        assert_eq!(p.resolve("/static/a.js", 404, "application/json"), 600);
    }

    #[test]
    fn status_rule_wins_over_content_type() {
        let p = policy();
        assert_eq!(p.resolve("/api/a", 200, "application/json"), 5);
    }

    #[test]
    fn content_type_rule_is_used_when_status_is_unmatched() {
        let p = policy();
        assert_eq!(p.resolve("/api/a", 500, "application/json; charset=utf-8"), 30);
    }

    #[test]
    fn default_applies_when_nothing_matches() {
        let p = policy();
        assert_eq!(p.resolve("/api/a", 500, "text/plain"), 15);
    }
}
