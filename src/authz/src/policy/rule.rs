//! Policy rule model
//!
//! Rules are persisted as flat string records ([`PolicyRecord`]) but handled
//! as typed values everywhere else: "match anything" is the explicit `Any`
//! variant of [`PathPattern`], [`MethodMatch`] and [`DeptScope`], never a
//! string comparison against `"*"`.

use crate::error::{AuthzError, Result};
use apigov_core::{DeptId, NO_DEPARTMENT};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wildcard token used in the persisted representation
pub const WILDCARD: &str = "*";

/// Unique policy row identifier
pub type PolicyId = i64;

/// Rule discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// `(role, path, method, department, effect)` grant
    Permission,
    /// Direct membership `subject -> role`
    Grouping,
}

impl RuleKind {
    /// Persisted `ptype` column value
    pub fn as_ptype(&self) -> &'static str {
        match self {
            RuleKind::Permission => "p",
            RuleKind::Grouping => "g",
        }
    }

    pub fn from_ptype(ptype: &str) -> Result<Self> {
        match ptype {
            "p" | "permission" => Ok(RuleKind::Permission),
            "g" | "grouping" => Ok(RuleKind::Grouping),
            other => Err(AuthzError::InvalidPolicy(format!("unknown rule type '{}'", other))),
        }
    }
}

/// Rule effect. Only grants are modelled; absence of a grant denies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    #[default]
    Allow,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        "allow"
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "" | "allow" => Ok(Effect::Allow),
            other => Err(AuthzError::InvalidPolicy(format!("unsupported effect '{}'", other))),
        }
    }
}

/// Resource pattern of a permission rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PathPattern {
    /// Literal `*`: any path
    Any,
    /// Exact path
    Exact(String),
    /// Path containing `*`; each `*` matches any run of characters
    Glob(String),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        if pattern == WILDCARD {
            PathPattern::Any
        } else if pattern.contains('*') {
            PathPattern::Glob(pattern.to_string())
        } else {
            PathPattern::Exact(pattern.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PathPattern::Any => WILDCARD,
            PathPattern::Exact(p) | PathPattern::Glob(p) => p,
        }
    }

    /// Compile into a matcher used by evaluator snapshots
    pub fn compile(&self) -> Result<PathMatcher> {
        match self {
            PathPattern::Any => Ok(PathMatcher::Any),
            PathPattern::Exact(p) => Ok(PathMatcher::Exact(p.clone())),
            PathPattern::Glob(p) => {
                let body = p
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(".*");
                let regex = Regex::new(&format!("^{}$", body)).map_err(|e| {
                    AuthzError::InvalidPolicy(format!("invalid resource pattern '{}': {}", p, e))
                })?;
                Ok(PathMatcher::Glob(regex))
            }
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Precompiled form of [`PathPattern`]
#[derive(Debug, Clone)]
pub enum PathMatcher {
    Any,
    Exact(String),
    Glob(Regex),
}

impl PathMatcher {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Any => true,
            PathMatcher::Exact(p) => p == path,
            PathMatcher::Glob(re) => re.is_match(path),
        }
    }
}

/// HTTP verb of a permission rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MethodMatch {
    Any,
    /// Upper-cased verb
    Exact(String),
}

impl MethodMatch {
    pub fn parse(method: &str) -> Self {
        if method == WILDCARD {
            MethodMatch::Any
        } else {
            MethodMatch::Exact(method.to_ascii_uppercase())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MethodMatch::Any => WILDCARD,
            MethodMatch::Exact(m) => m,
        }
    }

    pub fn matches(&self, method: &str) -> bool {
        match self {
            MethodMatch::Any => true,
            MethodMatch::Exact(m) => m.eq_ignore_ascii_case(method),
        }
    }
}

/// Department scope of a permission rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DeptScope {
    /// Applies regardless of the requester's department
    Any,
    /// Applies only to requests from this department
    Dept(DeptId),
}

impl DeptScope {
    /// Scope for an optional department: `None` and `Some(0)` mean any
    pub fn from_optional(dept_id: Option<DeptId>) -> Self {
        match dept_id {
            Some(id) if id != NO_DEPARTMENT => DeptScope::Dept(id),
            _ => DeptScope::Any,
        }
    }

    /// Parse the persisted column; an empty column is treated as `*`
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "" | WILDCARD => Ok(DeptScope::Any),
            other => other.parse::<DeptId>().map(DeptScope::Dept).map_err(|_| {
                AuthzError::InvalidPolicy(format!("invalid department scope '{}'", other))
            }),
        }
    }

    pub fn to_column(&self) -> String {
        match self {
            DeptScope::Any => WILDCARD.to_string(),
            DeptScope::Dept(id) => id.to_string(),
        }
    }

    /// Department `0` only ever matches `Any`.
    pub fn matches(&self, dept_id: DeptId) -> bool {
        match self {
            DeptScope::Any => true,
            DeptScope::Dept(id) => dept_id != NO_DEPARTMENT && *id == dept_id,
        }
    }
}

/// Grant of `(path, method)` to a role within a department scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Role code
    pub subject: String,
    pub resource: PathPattern,
    pub action: MethodMatch,
    pub department: DeptScope,
    #[serde(default)]
    pub effect: Effect,
}

impl PermissionRule {
    /// Build an allow rule from raw path/method strings
    pub fn allow(
        subject: impl Into<String>,
        resource: &str,
        action: &str,
        department: DeptScope,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: PathPattern::parse(resource),
            action: MethodMatch::parse(action),
            department,
            effect: Effect::Allow,
        }
    }
}

/// Membership of a subject (usually `user_<id>`) in a role
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupingRule {
    pub subject: String,
    pub role: String,
}

/// Typed policy rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PolicyRule {
    Permission(PermissionRule),
    Grouping(GroupingRule),
}

impl PolicyRule {
    pub fn permission(
        subject: impl Into<String>,
        resource: &str,
        action: &str,
        department: DeptScope,
    ) -> Self {
        PolicyRule::Permission(PermissionRule::allow(subject, resource, action, department))
    }

    pub fn grouping(subject: impl Into<String>, role: impl Into<String>) -> Self {
        PolicyRule::Grouping(GroupingRule {
            subject: subject.into(),
            role: role.into(),
        })
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            PolicyRule::Permission(_) => RuleKind::Permission,
            PolicyRule::Grouping(_) => RuleKind::Grouping,
        }
    }

    pub fn subject(&self) -> &str {
        match self {
            PolicyRule::Permission(p) => &p.subject,
            PolicyRule::Grouping(g) => &g.subject,
        }
    }
}

/// Flat persisted representation of a rule
///
/// | column | permission | grouping |
/// |---|---|---|
/// | `rule_type` | `p` | `g` |
/// | `subject` | role code | member subject |
/// | `resource` | path pattern | role code |
/// | `action` | verb or `*` | empty |
/// | `department` | id or `*` | empty |
/// | `effect` | `allow` | empty |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    #[serde(default)]
    pub id: PolicyId,
    pub rule_type: String,
    pub subject: String,
    pub resource: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub effect: String,
}

impl PolicyRecord {
    pub fn from_rule(id: PolicyId, rule: &PolicyRule) -> Self {
        match rule {
            PolicyRule::Permission(p) => Self {
                id,
                rule_type: RuleKind::Permission.as_ptype().to_string(),
                subject: p.subject.clone(),
                resource: p.resource.as_str().to_string(),
                action: p.action.as_str().to_string(),
                department: p.department.to_column(),
                effect: p.effect.as_str().to_string(),
            },
            PolicyRule::Grouping(g) => Self {
                id,
                rule_type: RuleKind::Grouping.as_ptype().to_string(),
                subject: g.subject.clone(),
                resource: g.role.clone(),
                action: String::new(),
                department: String::new(),
                effect: String::new(),
            },
        }
    }

    /// Decode into a typed rule
    pub fn to_rule(&self) -> Result<PolicyRule> {
        if self.subject.is_empty() || self.resource.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "policy {} has an empty subject or resource",
                self.id
            )));
        }

        match RuleKind::from_ptype(&self.rule_type)? {
            RuleKind::Permission => {
                if self.action.is_empty() {
                    return Err(AuthzError::InvalidPolicy(format!(
                        "policy {} has an empty action",
                        self.id
                    )));
                }
                Ok(PolicyRule::Permission(PermissionRule {
                    subject: self.subject.clone(),
                    resource: PathPattern::parse(&self.resource),
                    action: MethodMatch::parse(&self.action),
                    department: DeptScope::parse(&self.department)?,
                    effect: Effect::parse(&self.effect)?,
                }))
            }
            RuleKind::Grouping => Ok(PolicyRule::grouping(&self.subject, &self.resource)),
        }
    }

    /// Whether two records describe the same rule, ignoring ids
    pub fn same_rule(&self, other: &PolicyRecord) -> bool {
        self.rule_type == other.rule_type
            && self.subject == other.subject
            && self.resource == other.resource
            && self.action == other.action
            && self.department == other.department
            && self.effect == other.effect
    }
}
