//! 身份: 用户或群组

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// 用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// 显式域名，为空时从 `id` 的 `@` 后缀推导
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domain: None,
            groups: BTreeSet::new(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain
            .as_deref()
            .or_else(|| self.id.rsplit_once('@').map(|(_, domain)| domain))
    }
}

/// 群组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub members: Vec<Identity>,
}

impl Group {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: Vec::new(),
        }
    }
}

/// 访问主体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    User(User),
    Group(Group),
}

impl Identity {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(User::new(id))
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self::Group(Group::new(id))
    }

    pub fn id(&self) -> &str {
        match self {
            Self::User(user) => &user.id,
            Self::Group(group) => &group.id,
        }
    }

    /// 日志与错误中使用的主体标识 (e.g., "user:alice@example.com")
    pub fn subject(&self) -> String {
        match self {
            Self::User(user) => format!("user:{}", user.id),
            Self::Group(group) => format!("group:{}", group.id),
        }
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self::User(user)
    }
}

impl From<Group> for Identity {
    fn from(group: Group) -> Self {
        Self::Group(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_derived_from_id() {
        assert_eq!(User::new("alice@example.com").domain(), Some("example.com"));
        assert_eq!(User::new("alice").domain(), None);
        assert_eq!(
            User::new("alice@example.com").with_domain("corp.example").domain(),
            Some("corp.example")
        );
    }

    #[test]
    fn test_identity_serialization_is_tagged() {
        let identity = Identity::from(User::new("bob").with_groups(["ops"]));
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["kind"], "user");
        assert_eq!(json["groups"][0], "ops");
        assert_eq!(Identity::group("ops").subject(), "group:ops");
    }
}
