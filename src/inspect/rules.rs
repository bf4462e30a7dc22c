//! Rule engine boundary and the bundled signature rule set
//!
//! The engine consumes the decomposed variables and returns zero or more
//! matches; zero matches means the transaction passes. The bundled
//! implementation loads a JSON list of signature rules, each targeting one
//! variable category with a regex (or a byte limit for the combined size).
//! Patterns are byte regexes so fields with embedded NULs are matched as the
//! wire bytes, not a lossy transcoding.

use std::fmt;
use std::path::Path;

use regex::bytes::Regex;
use serde::Deserialize;

use crate::error::{Result, WafError};
use crate::inspect::variables::TransactionVariables;

/// Severity of a rule match, most severe last so `Ord` picks it as max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Notice,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// One rule match reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule_id: u32,
    pub message: String,
    pub severity: Severity,
}

/// Boundary to the rule-matching engine.
///
/// Invoked once per transaction after decomposition completes.
pub trait RuleEngine: Send + Sync {
    fn evaluate(&self, vars: &TransactionVariables) -> Vec<RuleMatch>;
}

/// Variable category a signature rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    PostFields,
    FileNames,
    PartHeaders,
    CombinedSize,
}

/// On-disk rule format
#[derive(Debug, Deserialize)]
pub struct SignatureRule {
    pub id: u32,
    pub message: String,
    pub severity: Severity,
    pub target: RuleTarget,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
}

enum Matcher {
    Pattern(Regex),
    Limit(u64),
}

struct CompiledRule {
    id: u32,
    message: String,
    severity: Severity,
    target: RuleTarget,
    matcher: Matcher,
}

impl CompiledRule {
    fn compile(rule: SignatureRule) -> Result<Self> {
        let matcher = match rule.target {
            RuleTarget::CombinedSize => {
                let limit = rule.limit.ok_or_else(|| {
                    WafError::Rules(format!("rule {}: combined_size requires a limit", rule.id))
                })?;
                Matcher::Limit(limit)
            }
            _ => {
                let pattern = rule.pattern.as_deref().ok_or_else(|| {
                    WafError::Rules(format!("rule {}: missing pattern", rule.id))
                })?;
                let regex = Regex::new(pattern).map_err(|e| {
                    WafError::Rules(format!("rule {}: invalid pattern: {}", rule.id, e))
                })?;
                Matcher::Pattern(regex)
            }
        };

        Ok(Self {
            id: rule.id,
            message: rule.message,
            severity: rule.severity,
            target: rule.target,
            matcher,
        })
    }

    fn matches(&self, vars: &TransactionVariables) -> bool {
        match (&self.matcher, self.target) {
            (Matcher::Limit(limit), _) => vars.combined_file_size() > *limit,
            (Matcher::Pattern(re), RuleTarget::PostFields) => vars
                .post_fields()
                .iter()
                .any(|(_, value)| re.is_match(value)),
            (Matcher::Pattern(re), RuleTarget::FileNames) => {
                vars.files().iter().any(|f| re.is_match(f.as_bytes()))
            }
            (Matcher::Pattern(re), RuleTarget::PartHeaders) => vars
                .part_headers()
                .values()
                .flatten()
                .any(|line| re.is_match(line.as_bytes())),
            (Matcher::Pattern(_), RuleTarget::CombinedSize) => false,
        }
    }
}

/// Rule set loaded once at startup; evaluation is read-only and lock-free.
pub struct SignatureRuleSet {
    rules: Vec<CompiledRule>,
}

impl SignatureRuleSet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn from_rules(rules: Vec<SignatureRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WafError::Rules(format!("cannot read {}: {}", path.display(), e))
        })?;
        let rules: Vec<SignatureRule> = serde_json::from_str(&content)
            .map_err(|e| WafError::Rules(format!("cannot parse {}: {}", path.display(), e)))?;
        Self::from_rules(rules)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleEngine for SignatureRuleSet {
    fn evaluate(&self, vars: &TransactionVariables) -> Vec<RuleMatch> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(vars))
            .map(|rule| RuleMatch {
                rule_id: rule.id,
                message: rule.message.clone(),
                severity: rule.severity,
            })
            .collect()
    }
}
