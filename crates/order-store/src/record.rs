//! Persisted order record and its status transition table.

use chrono::{DateTime, Utc};
use common::{Currency, Metadata, OrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a persisted order.
///
/// State transitions:
/// ```text
/// Created ──┬──► PaymentConfirmed
///           └──► Updated
/// ```
///
/// Re-applying the current status is always allowed so duplicate deliveries
/// are harmless. Nothing moves backwards and there is no failed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Checkout completed, order recorded.
    #[default]
    Created,

    /// The payment intent backing the order succeeded.
    PaymentConfirmed,

    /// A subscription invoice was paid.
    Updated,
}

impl OrderStatus {
    /// Returns true if a record in this status may be moved to `target`.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        *self == target
            || matches!(
                (self, target),
                (OrderStatus::Created, OrderStatus::PaymentConfirmed)
                    | (OrderStatus::Created, OrderStatus::Updated)
            )
    }

    /// Returns every status that may legally move to `target`, including itself.
    pub fn predecessors(target: OrderStatus) -> &'static [OrderStatus] {
        match target {
            OrderStatus::Created => &[OrderStatus::Created],
            OrderStatus::PaymentConfirmed => &[OrderStatus::Created, OrderStatus::PaymentConfirmed],
            OrderStatus::Updated => &[OrderStatus::Created, OrderStatus::Updated],
        }
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::PaymentConfirmed => "payment_confirmed",
            OrderStatus::Updated => "updated",
        }
    }

    /// Parses a stored status name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(OrderStatus::Created),
            "payment_confirmed" => Some(OrderStatus::PaymentConfirmed),
            "updated" => Some(OrderStatus::Updated),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted order.
///
/// Monetary fields hold the provider's minor-unit integers as fixed-point
/// decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub amount_total: Decimal,
    pub currency: Option<Currency>,
    pub status: OrderStatus,
    pub payment_intent_id: Option<String>,
    pub subscription_id: Option<String>,
    pub amount_paid: Option<Decimal>,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Creates a record in `Created` status stamped with `at`.
    pub fn new(order_id: OrderId, amount_total: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            customer_id: None,
            customer_email: None,
            amount_total,
            currency: None,
            status: OrderStatus::Created,
            payment_intent_id: None,
            subscription_id: None,
            amount_paid: None,
            payment_confirmed_at: None,
            metadata: Metadata::new(),
            created_at: at,
            updated_at: at,
        }
    }
}

/// How a conditional update locates its target record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    /// By partition key.
    OrderId(OrderId),
    /// By the payment intent recorded on the order at creation.
    PaymentIntent(String),
}

impl std::fmt::Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKey::OrderId(id) => write!(f, "order_id={id}"),
            OrderKey::PaymentIntent(pi) => write!(f, "payment_intent_id={pi}"),
        }
    }
}

/// A set of field assignments applied by a conditional update.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub subscription_id: Option<String>,
    pub amount_paid: Option<Decimal>,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl OrderPatch {
    /// Creates a patch that only refreshes `updated_at`.
    pub fn touch(at: DateTime<Utc>) -> Self {
        Self {
            status: None,
            subscription_id: None,
            amount_paid: None,
            payment_confirmed_at: None,
            updated_at: at,
        }
    }

    /// Sets the target status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the subscription id when present.
    pub fn subscription_id(mut self, subscription_id: Option<String>) -> Self {
        self.subscription_id = subscription_id;
        self
    }

    /// Sets the paid amount when present.
    pub fn amount_paid(mut self, amount_paid: Option<Decimal>) -> Self {
        self.amount_paid = amount_paid;
        self
    }

    /// Stamps the payment confirmation time.
    pub fn payment_confirmed_at(mut self, at: DateTime<Utc>) -> Self {
        self.payment_confirmed_at = Some(at);
        self
    }

    /// Returns true if `record` may receive this patch.
    pub fn is_allowed_for(&self, record: &OrderRecord) -> bool {
        self.status
            .is_none_or(|target| record.status.can_transition_to(target))
    }

    /// Applies the patch in place.
    ///
    /// The first confirmation time wins and `updated_at` never moves
    /// backwards, so applying the same patch twice or out of order converges
    /// on one state.
    pub fn apply_to(&self, record: &mut OrderRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(ref subscription_id) = self.subscription_id {
            record.subscription_id = Some(subscription_id.clone());
        }
        if let Some(amount_paid) = self.amount_paid {
            record.amount_paid = Some(amount_paid);
        }
        if let Some(at) = self.payment_confirmed_at {
            record.payment_confirmed_at.get_or_insert(at);
        }
        record.updated_at = record.updated_at.max(self.updated_at);
    }
}

/// Outcome of a conditional `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The record was inserted or overwritten.
    Written,
    /// An existing record had already advanced past `Created` and was kept.
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_default_status_is_created() {
        assert_eq!(OrderStatus::default(), OrderStatus::Created);
    }

    #[test]
    fn test_created_can_move_forward() {
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::PaymentConfirmed));
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::Updated));
    }

    #[test]
    fn test_self_transitions_are_allowed() {
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::Created));
        assert!(OrderStatus::PaymentConfirmed.can_transition_to(OrderStatus::PaymentConfirmed));
        assert!(OrderStatus::Updated.can_transition_to(OrderStatus::Updated));
    }

    #[test]
    fn test_no_backwards_or_cross_transitions() {
        assert!(!OrderStatus::PaymentConfirmed.can_transition_to(OrderStatus::Created));
        assert!(!OrderStatus::Updated.can_transition_to(OrderStatus::Created));
        assert!(!OrderStatus::PaymentConfirmed.can_transition_to(OrderStatus::Updated));
        assert!(!OrderStatus::Updated.can_transition_to(OrderStatus::PaymentConfirmed));
    }

    #[test]
    fn test_predecessors_match_transition_table() {
        for target in [
            OrderStatus::Created,
            OrderStatus::PaymentConfirmed,
            OrderStatus::Updated,
        ] {
            for from in [
                OrderStatus::Created,
                OrderStatus::PaymentConfirmed,
                OrderStatus::Updated,
            ] {
                assert_eq!(
                    OrderStatus::predecessors(target).contains(&from),
                    from.can_transition_to(target),
                    "{from} -> {target}"
                );
            }
        }
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            OrderStatus::Created,
            OrderStatus::PaymentConfirmed,
            OrderStatus::Updated,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("failed"), None);
    }

    #[test]
    fn test_patch_keeps_first_confirmation_and_latest_update() {
        let mut record = OrderRecord::new(OrderId::new("cs_1"), Decimal::from(2500), at(100));

        OrderPatch::touch(at(300))
            .status(OrderStatus::PaymentConfirmed)
            .payment_confirmed_at(at(300))
            .apply_to(&mut record);
        OrderPatch::touch(at(200))
            .status(OrderStatus::PaymentConfirmed)
            .payment_confirmed_at(at(200))
            .apply_to(&mut record);

        assert_eq!(record.status, OrderStatus::PaymentConfirmed);
        assert_eq!(record.payment_confirmed_at, Some(at(300)));
        assert_eq!(record.updated_at, at(300));
    }

    #[test]
    fn test_patch_leaves_absent_fields_untouched() {
        let mut record = OrderRecord::new(OrderId::new("in_1"), Decimal::ZERO, at(100));
        record.subscription_id = Some("sub_1".to_string());

        OrderPatch::touch(at(150))
            .amount_paid(Some(Decimal::from(900)))
            .apply_to(&mut record);

        assert_eq!(record.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(record.amount_paid, Some(Decimal::from(900)));
        assert_eq!(record.status, OrderStatus::Created);
    }

    #[test]
    fn test_patch_allowed_only_along_table() {
        let mut record = OrderRecord::new(OrderId::new("cs_1"), Decimal::ZERO, at(0));
        record.status = OrderStatus::Updated;

        let confirm = OrderPatch::touch(at(1)).status(OrderStatus::PaymentConfirmed);
        assert!(!confirm.is_allowed_for(&record));
        assert!(OrderPatch::touch(at(1)).is_allowed_for(&record));
    }
}
