//! Core delegation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique delegation identifier
pub type DelegationId = String;

/// Unique agent identifier
pub type AgentId = String;

/// Persisted delegation status
///
/// Expiry is derived at read time from `expires_at` and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DelegationStatus {
    /// Grant is in force
    Active,
    /// Grant was revoked (terminal)
    Revoked,
}

/// Hour-of-day window, inclusive start, exclusive end (0..=24)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl TimeWindow {
    pub fn new(start_hour: u8, end_hour: u8) -> Self {
        Self { start_hour, end_hour }
    }

    /// Intersect two windows
    pub fn intersect(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow {
            start_hour: self.start_hour.max(other.start_hour),
            end_hour: self.end_hour.min(other.end_hour),
        }
    }

    /// An intersection of disjoint windows leaves no usable hour
    pub fn is_empty(&self) -> bool {
        self.start_hour >= self.end_hour
    }

    pub fn contains_hour(&self, hour: u8) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }

    /// Hours within a day and a non-empty span
    pub fn is_well_formed(&self) -> bool {
        self.end_hour <= 24 && self.start_hour < self.end_hour
    }
}

/// Constraints attached to a single delegation
///
/// Every optional field distinguishes "not set by this link" (`None`) from
/// "set, possibly to an empty collection" (`Some`). `permissions` is the
/// exception: an absent set is the empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Upper bound per transaction, in minor currency units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_merchants: Option<BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_merchants: Option<BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_categories: Option<BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_categories: Option<BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_usage_count: Option<u64>,

    /// Capabilities granted by this link
    #[serde(default)]
    pub permissions: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_reason: Option<bool>,

    /// Absolute chain depth that descendants of this grant may reach
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delegation_depth: Option<u32>,
}

impl Constraints {
    /// Create constraints granting the given permissions
    pub fn with_permissions<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn max_amount(mut self, amount: u64) -> Self {
        self.max_amount = Some(amount);
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn allowed_merchants<I, S>(mut self, merchants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_merchants = Some(merchants.into_iter().map(Into::into).collect());
        self
    }

    pub fn blocked_merchants<I, S>(mut self, merchants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_merchants = Some(merchants.into_iter().map(Into::into).collect());
        self
    }

    pub fn allowed_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn blocked_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_usage_count(mut self, count: u64) -> Self {
        self.max_usage_count = Some(count);
        self
    }

    pub fn time_window(mut self, start_hour: u8, end_hour: u8) -> Self {
        self.time_window = Some(TimeWindow::new(start_hour, end_hour));
        self
    }

    pub fn require_reason(mut self, required: bool) -> Self {
        self.require_reason = Some(required);
        self
    }

    pub fn max_delegation_depth(mut self, depth: u32) -> Self {
        self.max_delegation_depth = Some(depth);
        self
    }
}

/// Who revoked a delegation, when and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationMetadata {
    pub reason: String,
    pub revoked_by: String,
    pub revoked_at: DateTime<Utc>,
}

/// One issued grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationNode {
    pub id: DelegationId,
    pub issuer_agent_id: AgentId,
    pub recipient_agent_id: AgentId,
    pub constraints: Constraints,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: DelegationStatus,

    /// Digest of the signed token
    pub token_hash: String,

    /// Pairwise digest binding this node to its parent's id
    pub link_hash: String,

    /// Immediate ancestor; `None` marks a root
    pub parent_id: Option<DelegationId>,

    /// 1 for a root, verified parent chain length + 1 otherwise
    pub depth: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation: Option<RevocationMetadata>,
}

impl DelegationNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Active and not yet expired
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == DelegationStatus::Active && !self.is_expired_at(now)
    }
}

/// Fields needed to persist a new delegation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDelegation {
    pub id: DelegationId,
    pub issuer_agent_id: AgentId,
    pub recipient_agent_id: AgentId,
    pub constraints: Constraints,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token_hash: String,
    pub link_hash: String,
    pub parent_id: Option<DelegationId>,
    pub depth: u32,
}

impl NewDelegation {
    /// Materialize as an active node
    pub fn into_node(self) -> DelegationNode {
        DelegationNode {
            id: self.id,
            issuer_agent_id: self.issuer_agent_id,
            recipient_agent_id: self.recipient_agent_id,
            constraints: self.constraints,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            status: DelegationStatus::Active,
            token_hash: self.token_hash,
            link_hash: self.link_hash,
            parent_id: self.parent_id,
            depth: self.depth,
            revocation: None,
        }
    }
}

/// Agent liveness as reported by the agent directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentStatus {
    Active,
    Suspended,
    Deactivated,
}

/// Agent directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub status: AgentStatus,
}

impl AgentRecord {
    pub fn new(id: impl Into<String>, status: AgentStatus) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

/// Classification of a verification finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    NotFound,
    Revoked,
    Expired,
    DepthExceeded,
    IssuerInactive,
    RecipientInactive,
    ParentChainInvalid,
    ParentChainCorrupt,
    /// First node points at a parent that cannot be resolved
    ChainTruncated,
    /// Child outlives its parent (warning)
    ExpiryExceedsParent,
    /// Child names a different currency than an ancestor (warning)
    CurrencyMismatch,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueCode::NotFound => "NOT_FOUND",
            IssueCode::Revoked => "REVOKED",
            IssueCode::Expired => "EXPIRED",
            IssueCode::DepthExceeded => "DEPTH_EXCEEDED",
            IssueCode::IssuerInactive => "ISSUER_INACTIVE",
            IssueCode::RecipientInactive => "RECIPIENT_INACTIVE",
            IssueCode::ParentChainInvalid => "PARENT_CHAIN_INVALID",
            IssueCode::ParentChainCorrupt => "PARENT_CHAIN_CORRUPT",
            IssueCode::ChainTruncated => "CHAIN_TRUNCATED",
            IssueCode::ExpiryExceedsParent => "EXPIRY_EXCEEDS_PARENT",
            IssueCode::CurrencyMismatch => "CURRENCY_MISMATCH",
        };
        f.write_str(s)
    }
}

/// A single error or warning produced while verifying a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIssue {
    pub code: IssueCode,
    pub delegation_id: DelegationId,
    pub message: String,
}

impl ChainIssue {
    pub fn new(
        code: IssueCode,
        delegation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            delegation_id: delegation_id.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.delegation_id, self.message)
    }
}
