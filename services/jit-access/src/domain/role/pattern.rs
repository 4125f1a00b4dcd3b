//! 权限/资源匹配模式
//!
//! 只支持末尾通配 (`s3:Get*`) 与单独的 `*`，其余字符按字面量区分大小写匹配

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 匹配模式
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(String);

impl Pattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.ends_with('*')
    }

    fn prefix(&self) -> Option<&str> {
        self.0.strip_suffix('*')
    }

    /// 是否匹配具体的权限/资源标识
    pub fn matches(&self, value: &str) -> bool {
        match self.prefix() {
            Some(prefix) => value.starts_with(prefix),
            None => self.0 == value,
        }
    }

    /// 本模式能否覆盖 `other` 匹配到的全部值
    pub fn covers(&self, other: &Pattern) -> bool {
        match (self.prefix(), other.prefix()) {
            (Some(prefix), Some(other_prefix)) => other_prefix.starts_with(prefix),
            (Some(prefix), None) => other.0.starts_with(prefix),
            (None, Some(_)) => false,
            (None, None) => self.0 == other.0,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Pattern {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Pattern {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 单个角色声明的 allow/deny 规则
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRules {
    #[serde(default)]
    pub allow: BTreeSet<Pattern>,
    #[serde(default)]
    pub deny: BTreeSet<Pattern>,
}

impl PatternRules {
    pub fn new<A, D>(allow: A, deny: D) -> Self
    where
        A: IntoIterator,
        A::Item: Into<Pattern>,
        D: IntoIterator,
        D::Item: Into<Pattern>,
    {
        Self {
            allow: allow.into_iter().map(Into::into).collect(),
            deny: deny.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// 合并后的有效规则 (deny 优先)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPatterns {
    pub allow: BTreeSet<Pattern>,
    pub deny: BTreeSet<Pattern>,
}

impl ResolvedPatterns {
    /// 合并多组规则
    ///
    /// 先收集全部 allow 与 deny，再剔除被任一 deny 完全覆盖的 allow。
    /// 部分重叠的 deny 保留下来，在 `permits` 时生效，结果与合并顺序无关
    pub fn merge<'a>(rules: impl IntoIterator<Item = &'a PatternRules>) -> Self {
        let mut allow = BTreeSet::new();
        let mut deny = BTreeSet::new();
        for rule in rules {
            allow.extend(rule.allow.iter().cloned());
            deny.extend(rule.deny.iter().cloned());
        }
        allow.retain(|a: &Pattern| !deny.iter().any(|d: &Pattern| d.covers(a)));
        Self { allow, deny }
    }

    /// 具体值是否被授予
    pub fn permits(&self, value: &str) -> bool {
        self.allow.iter().any(|p| p.matches(value)) && !self.deny.iter().any(|p| p.matches(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_match() {
        assert!(Pattern::new("s3:Get*").matches("s3:GetObject"));
        assert!(Pattern::new("*").matches("anything"));
        assert!(!Pattern::new("s3:Get*").matches("s3:PutObject"));
        assert!(Pattern::new("s3:GetObject").matches("s3:GetObject"));
        assert!(!Pattern::new("s3:GetObject").matches("s3:getobject"));
    }

    #[test]
    fn test_covers() {
        assert!(Pattern::new("s3:*").covers(&Pattern::new("s3:Get*")));
        assert!(Pattern::new("s3:*").covers(&Pattern::new("s3:GetObject")));
        assert!(!Pattern::new("s3:GetObject").covers(&Pattern::new("s3:Get*")));
        assert!(!Pattern::new("s3:Get*").covers(&Pattern::new("s3:*")));
    }

    #[test]
    fn test_deny_overrides_allow() {
        let parent = PatternRules::new(["s3:*"], Vec::<&str>::new());
        let child = PatternRules::new(Vec::<&str>::new(), ["s3:Delete*"]);
        let merged = ResolvedPatterns::merge([&parent, &child]);

        assert!(merged.permits("s3:GetObject"));
        assert!(!merged.permits("s3:DeleteObject"));
        // 被完全覆盖的 allow 被剔除
        let exact = ResolvedPatterns::merge([
            &PatternRules::new(["s3:GetObject"], Vec::<&str>::new()),
            &PatternRules::new(Vec::<&str>::new(), ["s3:Get*"]),
        ]);
        assert!(exact.allow.is_empty());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = PatternRules::new(["ec2:*"], ["ec2:Terminate*"]);
        let b = PatternRules::new(["ec2:TerminateInstances"], Vec::<&str>::new());
        assert_eq!(ResolvedPatterns::merge([&a, &b]), ResolvedPatterns::merge([&b, &a]));
    }
}
