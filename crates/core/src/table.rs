//! The closed set of tables covered by weekly snapshots.

use core::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};
use crate::rows::{GovernanceTierRow, ProfileRow, SubscriptionRow, UserRow, WebhookEventRow};

/// A stored row as a key-ordered field map.
pub type Document = serde_json::Map<String, JsonValue>;

/// Tables whose contents must survive a total loss of the primary store.
///
/// Each variant is bound to a typed row schema (see [`TableRow`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalTable {
    Users,
    Profiles,
    Subscriptions,
    GovernanceTiers,
    #[serde(rename = "processed_webhook_events")]
    WebhookEvents,
}

impl CriticalTable {
    /// Every critical table, in export order.
    pub const ALL: [CriticalTable; 5] = [
        CriticalTable::Users,
        CriticalTable::Profiles,
        CriticalTable::Subscriptions,
        CriticalTable::GovernanceTiers,
        CriticalTable::WebhookEvents,
    ];

    /// Table name as used by the data store.
    pub const fn as_str(self) -> &'static str {
        match self {
            CriticalTable::Users => "users",
            CriticalTable::Profiles => "profiles",
            CriticalTable::Subscriptions => "subscriptions",
            CriticalTable::GovernanceTiers => "governance_tiers",
            CriticalTable::WebhookEvents => "processed_webhook_events",
        }
    }

    /// Check that a stored row deserializes into this table's row schema.
    ///
    /// Extra fields are tolerated; missing or mistyped schema fields are not.
    pub fn check_row(self, row: &Document) -> DomainResult<()> {
        match self {
            CriticalTable::Users => check::<UserRow>(row),
            CriticalTable::Profiles => check::<ProfileRow>(row),
            CriticalTable::Subscriptions => check::<SubscriptionRow>(row),
            CriticalTable::GovernanceTiers => check::<GovernanceTierRow>(row),
            CriticalTable::WebhookEvents => check::<WebhookEventRow>(row),
        }
    }
}

impl core::fmt::Display for CriticalTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CriticalTable {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CriticalTable::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::UnknownTable(s.to_string()))
    }
}

/// A typed row schema bound to exactly one critical table.
pub trait TableRow: Serialize + DeserializeOwned {
    const TABLE: CriticalTable;

    /// Decode a stored row into this schema.
    fn from_document(row: &Document) -> DomainResult<Self> {
        serde_json::from_value(JsonValue::Object(row.clone()))
            .map_err(|e| DomainError::row_shape(Self::TABLE.as_str(), e.to_string()))
    }

    /// Encode this row as a store document.
    fn to_document(&self) -> DomainResult<Document> {
        match serde_json::to_value(self) {
            Ok(JsonValue::Object(map)) => Ok(map),
            Ok(other) => Err(DomainError::row_shape(
                Self::TABLE.as_str(),
                format!("row serialized to non-object: {other}"),
            )),
            Err(e) => Err(DomainError::row_shape(Self::TABLE.as_str(), e.to_string())),
        }
    }
}

fn check<R: TableRow>(row: &Document) -> DomainResult<()> {
    R::from_document(row).map(|_| ())
}
