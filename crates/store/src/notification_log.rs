//! Append-only record of notification dispatch attempts.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{NotificationId, TenantId, UserId};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// What a notification was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Welcome,
    OrderConfirmation,
    OrderStatusUpdate,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Welcome => "WELCOME",
            NotificationKind::OrderConfirmation => "ORDER_CONFIRMATION",
            NotificationKind::OrderStatusUpdate => "ORDER_STATUS_UPDATE",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "WELCOME" => Ok(NotificationKind::Welcome),
            "ORDER_CONFIRMATION" => Ok(NotificationKind::OrderConfirmation),
            "ORDER_STATUS_UPDATE" => Ok(NotificationKind::OrderStatusUpdate),
            other => Err(StoreError::Corrupt {
                table: "notifications_log",
                reason: format!("unknown notification type {other}"),
            }),
        }
    }
}

/// One dispatch attempt and its per-channel results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    /// Order number, or `welcome` for welcome messages.
    pub reference: String,
    /// Per-channel outcome blob as produced by the dispatcher.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn new(
        tenant_id: TenantId,
        user_id: UserId,
        kind: NotificationKind,
        reference: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            tenant_id,
            user_id,
            kind,
            reference: reference.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Filter for listing log records, newest first.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub tenant_id: TenantId,
    pub kind: Option<NotificationKind>,
    pub user_id: Option<UserId>,
    pub limit: usize,
    pub offset: usize,
}

impl LogQuery {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            kind: None,
            user_id: None,
            limit: 50,
            offset: 0,
        }
    }

    pub fn kind(mut self, kind: NotificationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub(crate) fn matches(&self, record: &NotificationRecord) -> bool {
        record.tenant_id == self.tenant_id
            && self.kind.is_none_or(|kind| record.kind == kind)
            && self.user_id.is_none_or(|user| record.user_id == user)
    }
}

/// Number of recipients listed in [`NotificationStats::top_recipients`].
pub const TOP_RECIPIENTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCount {
    pub kind: NotificationKind,
    pub count: u64,
}

/// Records created on one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// A user and how many records name them. Name and email are absent when
/// the user no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientCount {
    pub user_id: UserId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub count: u64,
}

/// Aggregates over a tenant's notification log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStats {
    pub total: u64,
    /// Most frequent kind first.
    pub by_kind: Vec<KindCount>,
    /// Days with activity since the cutoff, newest first.
    pub recent_activity: Vec<DailyCount>,
    /// Busiest recipients first, at most [`TOP_RECIPIENTS`].
    pub top_recipients: Vec<RecipientCount>,
}

impl NotificationStats {
    /// Tallies records that already belong to one tenant. Recipient names
    /// are left empty for the caller to fill in.
    pub fn tally<'a>(
        records: impl IntoIterator<Item = &'a NotificationRecord>,
        since: DateTime<Utc>,
    ) -> Self {
        let mut total = 0;
        let mut by_kind: HashMap<NotificationKind, u64> = HashMap::new();
        let mut by_day: HashMap<NaiveDate, u64> = HashMap::new();
        let mut by_user: HashMap<UserId, u64> = HashMap::new();

        for record in records {
            total += 1;
            *by_kind.entry(record.kind).or_default() += 1;
            *by_user.entry(record.user_id).or_default() += 1;
            if record.created_at >= since {
                *by_day.entry(record.created_at.date_naive()).or_default() += 1;
            }
        }

        let mut by_kind: Vec<_> = by_kind
            .into_iter()
            .map(|(kind, count)| KindCount { kind, count })
            .collect();
        by_kind.sort_by_key(|k| (Reverse(k.count), k.kind.as_str()));

        let mut recent_activity: Vec<_> = by_day
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect();
        recent_activity.sort_by_key(|d| Reverse(d.date));

        let mut top_recipients: Vec<_> = by_user
            .into_iter()
            .map(|(user_id, count)| RecipientCount {
                user_id,
                name: None,
                email: None,
                count,
            })
            .collect();
        top_recipients.sort_by_key(|r| (Reverse(r.count), r.user_id));
        top_recipients.truncate(TOP_RECIPIENTS);

        Self {
            total,
            by_kind,
            recent_activity,
            top_recipients,
        }
    }
}

/// Storage for notification log records.
#[async_trait]
pub trait NotificationLog: Send + Sync {
    /// Appends a record.
    async fn record(&self, record: NotificationRecord) -> Result<()>;

    /// Loads a single record within the tenant.
    async fn get(&self, tenant_id: TenantId, id: NotificationId)
    -> Result<Option<NotificationRecord>>;

    /// Lists records matching a query, newest first.
    async fn list(&self, query: &LogQuery) -> Result<Vec<NotificationRecord>>;

    /// Counts every record matching a query's filters, ignoring its page.
    async fn count(&self, query: &LogQuery) -> Result<u64>;

    /// Aggregates the tenant's log. Daily activity covers records created
    /// at or after `since`.
    async fn stats(&self, tenant_id: TenantId, since: DateTime<Utc>) -> Result<NotificationStats>;

    /// Deletes the tenant's records created before `cutoff`. Returns the count removed.
    async fn prune_older_than(&self, tenant_id: TenantId, cutoff: DateTime<Utc>) -> Result<u64>;
}
