//! Row schemas of the critical tables.
//!
//! Field names follow the store's camelCase convention.

use serde::{Deserialize, Serialize};

use crate::table::{CriticalTable, TableRow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRow {
    pub user_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_of_study: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// Billing state mirrored from the payment provider.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRow {
    pub user_id: String,
    pub plan: String,
    pub status: SubscriptionStatus,
    /// Unix epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceTierRow {
    pub user_id: String,
    pub tier: u32,
    pub points: i64,
}

/// Payment webhook event already handled (idempotency ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventRow {
    pub event_id: String,
    pub event_type: String,
    /// Unix epoch milliseconds.
    pub processed_at: i64,
}

impl TableRow for UserRow {
    const TABLE: CriticalTable = CriticalTable::Users;
}

impl TableRow for ProfileRow {
    const TABLE: CriticalTable = CriticalTable::Profiles;
}

impl TableRow for SubscriptionRow {
    const TABLE: CriticalTable = CriticalTable::Subscriptions;
}

impl TableRow for GovernanceTierRow {
    const TABLE: CriticalTable = CriticalTable::GovernanceTiers;
}

impl TableRow for WebhookEventRow {
    const TABLE: CriticalTable = CriticalTable::WebhookEvents;
}
