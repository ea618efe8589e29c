//! Data store access for ownership and membership lookups.
//!
//! Context resolvers only ever need two point reads:
//! - the linkage fields (owning user, owning company) of a resource, by primary key
//! - whether a user holds an *active* membership in a company
//!
//! [`AccessStore`] is that contract. [`PgAccessStore`] implements it on
//! PostgreSQL with sqlx; [`MemoryAccessStore`] implements it in-process.
//! Table and column names come from an [`AccessSchema`], validated once at
//! startup since they are interpolated into SQL.

pub mod memory;

pub use memory::MemoryAccessStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{AuthzError, Result};
use crate::rbac::models::{CompanyId, UserId};

static IDENTIFIER: OnceLock<regex::Regex> = OnceLock::new();

/// Whether `name` is a plain (optionally schema-qualified) SQL identifier.
pub fn is_safe_identifier(name: &str) -> bool {
    IDENTIFIER
        .get_or_init(|| {
            regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
                .expect("identifier pattern is valid")
        })
        .is_match(name)
}

fn check_identifier(what: &str, name: &str) -> Result<()> {
    if is_safe_identifier(name) {
        Ok(())
    } else {
        Err(AuthzError::invalid_schema(format!(
            "{} {:?} is not a valid SQL identifier",
            what, name
        )))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Schema Descriptors
// ═══════════════════════════════════════════════════════════════════════════════

/// Primary/foreign key representation in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    #[default]
    Text,
    Uuid,
}

impl KeyKind {
    /// Whether `id` can be a key of this kind at all.
    pub fn accepts(&self, id: &str) -> bool {
        match self {
            Self::Text => true,
            Self::Uuid => Uuid::parse_str(id).is_ok(),
        }
    }

    fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Text => format!("${}", n),
            Self::Uuid => format!("${}::uuid", n),
        }
    }
}

/// Where a resource type lives and which columns link it to users and companies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFamily {
    /// Resource tag as used in permission strings (e.g. "booking").
    pub resource_type: String,
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Column holding the owning user's id.
    #[serde(default)]
    pub owner_column: Option<String>,
    /// Column holding the owning company's id.
    #[serde(default)]
    pub company_column: Option<String>,
    #[serde(default)]
    pub key_kind: KeyKind,
}

fn default_id_column() -> String {
    "id".to_string()
}

impl ResourceFamily {
    pub fn new(resource_type: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            table: table.into(),
            id_column: default_id_column(),
            owner_column: None,
            company_column: None,
            key_kind: KeyKind::Text,
        }
    }

    pub fn owner_column(mut self, column: impl Into<String>) -> Self {
        self.owner_column = Some(column.into());
        self
    }

    pub fn company_column(mut self, column: impl Into<String>) -> Self {
        self.company_column = Some(column.into());
        self
    }

    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    pub fn key_kind(mut self, kind: KeyKind) -> Self {
        self.key_kind = kind;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.resource_type.trim().is_empty() {
            return Err(AuthzError::invalid_schema("resource family with empty resource_type"));
        }
        check_identifier("table", &self.table)?;
        check_identifier("id column", &self.id_column)?;
        if let Some(ref c) = self.owner_column {
            check_identifier("owner column", c)?;
        }
        if let Some(ref c) = self.company_column {
            check_identifier("company column", c)?;
        }
        if self.owner_column.is_none() && self.company_column.is_none() {
            return Err(AuthzError::invalid_schema(format!(
                "resource family {:?} links to neither an owner nor a company",
                self.resource_type
            )));
        }
        Ok(())
    }

    fn linkage_sql(&self) -> String {
        let owner = self
            .owner_column
            .as_deref()
            .map(|c| format!("{}::text", c))
            .unwrap_or_else(|| "NULL::text".to_string());
        let company = self
            .company_column
            .as_deref()
            .map(|c| format!("{}::text", c))
            .unwrap_or_else(|| "NULL::text".to_string());
        format!(
            "SELECT {} AS owner_id, {} AS company_id FROM {} WHERE {} = {} LIMIT 1",
            owner,
            company,
            self.table,
            self.id_column,
            self.key_kind.placeholder(1)
        )
    }
}

/// The table linking users to companies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSchema {
    pub table: String,
    pub user_column: String,
    pub company_column: String,
    pub active_column: String,
    #[serde(default)]
    pub key_kind: KeyKind,
}

impl Default for MembershipSchema {
    fn default() -> Self {
        Self {
            table: "company_members".to_string(),
            user_column: "user_id".to_string(),
            company_column: "company_id".to_string(),
            active_column: "is_active".to_string(),
            key_kind: KeyKind::Text,
        }
    }
}

impl MembershipSchema {
    pub fn validate(&self) -> Result<()> {
        check_identifier("membership table", &self.table)?;
        check_identifier("membership user column", &self.user_column)?;
        check_identifier("membership company column", &self.company_column)?;
        check_identifier("membership active column", &self.active_column)
    }

    fn membership_sql(&self) -> String {
        format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = {} AND {} = {} AND {} = TRUE)",
            self.table,
            self.user_column,
            self.key_kind.placeholder(1),
            self.company_column,
            self.key_kind.placeholder(2),
            self.active_column
        )
    }
}

/// All storage descriptors the resolvers need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSchema {
    #[serde(default = "default_families")]
    pub families: Vec<ResourceFamily>,
    #[serde(default)]
    pub membership: MembershipSchema,
}

impl Default for AccessSchema {
    fn default() -> Self {
        Self {
            families: default_families(),
            membership: MembershipSchema::default(),
        }
    }
}

fn default_families() -> Vec<ResourceFamily> {
    vec![
        ResourceFamily::new("booking", "bookings")
            .owner_column("user_id")
            .company_column("provider_company_id"),
        // A company is its own linkage target.
        ResourceFamily::new("company", "companies")
            .owner_column("owner_id")
            .company_column("id"),
        ResourceFamily::new("contract", "contracts")
            .owner_column("created_by")
            .company_column("company_id"),
        ResourceFamily::new("timesheet", "timesheets")
            .owner_column("user_id")
            .company_column("company_id"),
    ]
}

impl AccessSchema {
    /// Validate identifiers and reject duplicate resource types.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for family in &self.families {
            family.validate()?;
            if !seen.insert(family.resource_type.as_str()) {
                return Err(AuthzError::invalid_schema(format!(
                    "resource type {:?} is described twice",
                    family.resource_type
                )));
            }
        }
        self.membership.validate()
    }

    pub fn family(&self, resource_type: &str) -> Option<&ResourceFamily> {
        self.families.iter().find(|f| f.resource_type == resource_type)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Access Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Linkage fields of a single resource row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLinkage {
    pub owner_id: Option<UserId>,
    pub company_id: Option<CompanyId>,
}

impl ResourceLinkage {
    pub fn owned_by(owner: impl Into<UserId>) -> Self {
        Self {
            owner_id: Some(owner.into()),
            company_id: None,
        }
    }

    pub fn in_company(mut self, company: impl Into<CompanyId>) -> Self {
        self.company_id = Some(company.into());
        self
    }
}

/// Read-only point lookups used by context resolvers.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Linkage of a resource by primary key; `None` when it does not exist.
    async fn resource_linkage(
        &self,
        family: &ResourceFamily,
        id: &str,
    ) -> Result<Option<ResourceLinkage>>;

    /// Whether the user has an active membership in the company.
    async fn has_active_membership(&self, user_id: &UserId, company_id: &CompanyId) -> Result<bool>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PostgreSQL
// ═══════════════════════════════════════════════════════════════════════════════

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        info!(max_connections = config.max_connections, "Connected to database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// [`AccessStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgAccessStore {
    pool: PgPool,
    membership: MembershipSchema,
}

impl PgAccessStore {
    pub fn new(database: &Database, membership: MembershipSchema) -> Result<Self> {
        membership.validate()?;
        Ok(Self {
            pool: database.pool().clone(),
            membership,
        })
    }
}

#[async_trait]
impl AccessStore for PgAccessStore {
    async fn resource_linkage(
        &self,
        family: &ResourceFamily,
        id: &str,
    ) -> Result<Option<ResourceLinkage>> {
        if !family.key_kind.accepts(id) {
            debug!(resource_type = %family.resource_type, "Resource id is not a valid key");
            return Ok(None);
        }

        let row = sqlx::query(&family.linkage_sql())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let owner_id: Option<String> = row.try_get("owner_id")?;
        let company_id: Option<String> = row.try_get("company_id")?;
        Ok(Some(ResourceLinkage {
            owner_id: owner_id.map(UserId::from),
            company_id: company_id.map(CompanyId::from),
        }))
    }

    async fn has_active_membership(&self, user_id: &UserId, company_id: &CompanyId) -> Result<bool> {
        let kind = self.membership.key_kind;
        if !kind.accepts(user_id.as_str()) || !kind.accepts(company_id.as_str()) {
            return Ok(false);
        }

        let row = sqlx::query(&self.membership.membership_sql())
            .bind(user_id.as_str())
            .bind(company_id.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<bool, _>(0)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
