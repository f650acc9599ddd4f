//! Branch filter rules
//!
//! Filters use the familiar build-server syntax: whitespace-separated rules
//! of the form `+:pattern` (include) or `-:pattern` (exclude), where `*`
//! matches any sequence of characters. Rules are checked in order and the
//! first matching rule decides; a ref matching no rule is not accepted.

use regex::Regex;

#[derive(Debug, Clone)]
struct Rule {
    include: bool,
    pattern: Regex,
}

/// Compiled branch filter
#[derive(Debug, Clone)]
pub struct BranchFilter {
    rules: Vec<Rule>,
}

impl BranchFilter {
    /// Parse a filter string such as `+:refs/heads/main` or
    /// `+:refs/heads/* -:refs/heads/wip-*`. A bare pattern without a
    /// prefix counts as an include rule.
    pub fn parse(filter: &str) -> Self {
        let rules = filter
            .split_whitespace()
            .map(|token| {
                let (include, pattern) = match token.split_once(':') {
                    Some(("+", rest)) => (true, rest),
                    Some(("-", rest)) => (false, rest),
                    _ => (true, token),
                };
                Rule {
                    include,
                    pattern: Self::compile(pattern),
                }
            })
            .collect();

        BranchFilter { rules }
    }

    fn compile(pattern: &str) -> Regex {
        let parts: Vec<String> = pattern.split('*').map(|p| regex::escape(p)).collect();
        let regex = format!("^{}$", parts.join(".*"));
        // Escaped literals joined by ".*" always compile
        Regex::new(&regex).unwrap_or_else(|_| Regex::new("^$").unwrap())
    }

    /// Whether a ref passes the filter. The first matching rule decides.
    pub fn matches(&self, branch: &str) -> bool {
        for rule in &self.rules {
            if rule.pattern.is_match(branch) {
                return rule.include;
            }
        }
        false
    }
}
