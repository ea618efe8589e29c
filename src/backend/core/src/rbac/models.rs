//! RBAC data models: identifiers, scoped permissions, permission sets, and the
//! authenticated user handed over by the identity layer.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Strongly-typed company (tenant) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub String);

impl CompanyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CompanyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CompanyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// How far a permission reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Only resources the actor owns or reaches through company membership.
    Own,
    /// Any resource of the type.
    All,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Own => "own",
            Self::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "own" => Some(Self::Own),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A permission token of the form `resource:action:scope`, for example:
/// - `booking:read:own`
/// - `contract:approve:all`
/// - `timesheet:create:own`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    /// The resource type (e.g., "booking", "company").
    pub resource: String,
    /// The action (e.g., "read", "update", "approve").
    pub action: String,
    /// The scope of the grant.
    pub scope: Scope,
}

impl Permission {
    /// Create a new permission.
    pub fn new(resource: impl Into<String>, action: impl Into<String>, scope: Scope) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            scope,
        }
    }

    /// Shorthand for an `own`-scoped permission.
    pub fn own(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(resource, action, Scope::Own)
    }

    /// Shorthand for an `all`-scoped permission.
    pub fn all(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(resource, action, Scope::All)
    }

    /// Parse a permission from a string like `"booking:read:own"`.
    ///
    /// Exactly three non-empty segments are required and the last one must
    /// be a known scope. Surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(':');
        let resource = parts.next()?.trim();
        let action = parts.next()?.trim();
        let scope = Scope::parse(parts.next()?.trim())?;
        if parts.next().is_some() || resource.is_empty() || action.is_empty() {
            return None;
        }
        Some(Self::new(resource, action, scope))
    }

    /// Return the canonical string form `"resource:action:scope"`.
    pub fn as_string(&self) -> String {
        self.to_string()
    }

    /// The same resource and action with a different scope.
    pub fn with_scope(&self, scope: Scope) -> Self {
        Self::new(self.resource.clone(), self.action.clone(), scope)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.resource, self.action, self.scope)
    }
}

impl TryFrom<String> for Permission {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
            .ok_or_else(|| format!("expected resource:action:scope, got {:?}", value))
    }
}

impl From<Permission> for String {
    fn from(permission: Permission) -> Self {
        permission.to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Set
// ═══════════════════════════════════════════════════════════════════════════════

/// Unordered, duplicate-free set of permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(HashSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn remove(&mut self, permission: &Permission) -> bool {
        self.0.remove(permission)
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    /// Does the set hold `resource:action` at the given scope?
    pub fn grants(&self, resource: &str, action: &str, scope: Scope) -> bool {
        self.0
            .iter()
            .any(|p| p.scope == scope && p.resource == resource && p.action == action)
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Permission>) {
        self.0.extend(other);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Permissions rendered as strings, sorted for stable output.
    pub fn to_sorted_strings(&self) -> Vec<String> {
        let mut out: Vec<String> = self.0.iter().map(Permission::to_string).collect();
        out.sort();
        out
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PermissionSet {
    type Item = Permission;
    type IntoIter = std::collections::hash_set::IntoIter<Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authenticated User
// ═══════════════════════════════════════════════════════════════════════════════

/// The identity handed over by the session provider.
///
/// Treated as opaque and already verified; the role is a raw tag from the
/// session claims and may name a role the table does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub role: String,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
}

impl AuthenticatedUser {
    pub fn new(id: impl Into<UserId>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            company_id: None,
        }
    }

    pub fn with_company(mut self, company_id: impl Into<CompanyId>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_parse() {
        let perm = Permission::parse("booking:read:own").unwrap();
        assert_eq!(perm.resource, "booking");
        assert_eq!(perm.action, "read");
        assert_eq!(perm.scope, Scope::Own);
        assert_eq!(perm.as_string(), "booking:read:own");

        assert_eq!(
            Permission::parse(" contract:approve:all "),
            Some(Permission::all("contract", "approve"))
        );
    }

    #[test]
    fn test_permission_parse_rejects_malformed() {
        assert!(Permission::parse("booking").is_none());
        assert!(Permission::parse("booking:read").is_none());
        assert!(Permission::parse("booking:read:mine").is_none());
        assert!(Permission::parse("booking:read:own:extra").is_none());
        assert!(Permission::parse(":read:own").is_none());
        assert!(Permission::parse("booking::all").is_none());
        assert!(Permission::parse("").is_none());
    }

    #[test]
    fn test_permission_with_scope() {
        let own = Permission::own("booking", "read");
        assert_eq!(own.with_scope(Scope::All), Permission::all("booking", "read"));
    }

    #[test]
    fn test_permission_serde_as_string() {
        let perm = Permission::own("timesheet", "approve");
        let json = serde_json::to_string(&perm).unwrap();
        assert_eq!(json, "\"timesheet:approve:own\"");

        let back: Permission = serde_json::from_str(&json).unwrap();
        assert_eq!(back, perm);

        assert!(serde_json::from_str::<Permission>("\"timesheet:approve\"").is_err());
    }

    #[test]
    fn test_permission_set_is_duplicate_free() {
        let mut set = PermissionSet::new();
        assert!(set.insert(Permission::own("booking", "read")));
        assert!(!set.insert(Permission::own("booking", "read")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_permission_set_grants() {
        let set: PermissionSet = [
            Permission::own("booking", "read"),
            Permission::all("contract", "read"),
        ]
        .into_iter()
        .collect();

        assert!(set.grants("booking", "read", Scope::Own));
        assert!(!set.grants("booking", "read", Scope::All));
        assert!(set.grants("contract", "read", Scope::All));
        assert_eq!(
            set.to_sorted_strings(),
            vec!["booking:read:own".to_string(), "contract:read:all".to_string()]
        );
    }

    #[test]
    fn test_authenticated_user_builder() {
        let user = AuthenticatedUser::new("u1", "manager").with_company("c1");
        assert_eq!(user.id.as_str(), "u1");
        assert_eq!(user.company_id, Some(CompanyId::new("c1")));
    }
}
