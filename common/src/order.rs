use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::product::ProductId;

/// Unique order identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order lifecycle as reported by the backend.
///
/// The backend owns the state machine; a status string we do not know is kept
/// verbatim and offers no actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Processing,
    Verified,
    Shipping,
    Received,
    Completed,
    Cancelled,
    Unknown(String),
}

impl OrderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Processing" => OrderStatus::Processing,
            "Verified" => OrderStatus::Verified,
            "Shipping" => OrderStatus::Shipping,
            "Received" => OrderStatus::Received,
            "Completed" => OrderStatus::Completed,
            "Cancelled" => OrderStatus::Cancelled,
            other => OrderStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Processing => "Processing",
            OrderStatus::Verified => "Verified",
            OrderStatus::Shipping => "Shipping",
            OrderStatus::Received => "Received",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Unknown(raw) => raw,
        }
    }

    /// Position along the forward path. Cancelled and unknown statuses are off the path.
    pub fn ordinal(&self) -> Option<u8> {
        match self {
            OrderStatus::Processing => Some(0),
            OrderStatus::Verified => Some(1),
            OrderStatus::Shipping => Some(2),
            OrderStatus::Received => Some(3),
            OrderStatus::Completed => Some(4),
            OrderStatus::Cancelled | OrderStatus::Unknown(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(OrderStatus::parse(&raw))
    }
}

/// Something a staff member (or the customer) can do to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderAction {
    Verify,
    Cancel,
    StartShipping,
    AddTracking,
    EditTracking,
    DeleteTracking,
    FinishShipping,
    ConfirmReceipt,
}

impl OrderAction {
    pub fn label(self) -> &'static str {
        match self {
            OrderAction::Verify => "Verify Order",
            OrderAction::Cancel => "Cancel Order",
            OrderAction::StartShipping => "Start Shipping",
            OrderAction::AddTracking => "Add Tracking Update",
            OrderAction::EditTracking => "Edit Tracking Update",
            OrderAction::DeleteTracking => "Delete Tracking Update",
            OrderAction::FinishShipping => "Finish Shipping",
            OrderAction::ConfirmReceipt => "Order Received",
        }
    }

    /// Whether the action moves the order to another status.
    pub fn changes_status(self) -> bool {
        !matches!(
            self,
            OrderAction::AddTracking | OrderAction::EditTracking | OrderAction::DeleteTracking
        )
    }

    /// Question asked before the action is sent.
    pub fn confirmation_prompt(self) -> &'static str {
        match self {
            OrderAction::Verify => "Verify this order?",
            OrderAction::Cancel => "Cancel this order? This cannot be undone.",
            OrderAction::StartShipping => "Mark this order as shipping?",
            OrderAction::AddTracking => "Add this tracking update?",
            OrderAction::EditTracking => "Save changes to this tracking update?",
            OrderAction::DeleteTracking => "Delete this tracking update?",
            OrderAction::FinishShipping => "Mark shipping as finished?",
            OrderAction::ConfirmReceipt => "Confirm you received this order?",
        }
    }
}

/// An action offered for the current status, and whether it can be pressed now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionState {
    pub action: OrderAction,
    pub enabled: bool,
}

impl ActionState {
    fn enabled(action: OrderAction) -> Self {
        Self {
            action,
            enabled: true,
        }
    }
}

/// Actions offered for an order in `status` with `tracking_count` tracking updates.
///
/// Only the forward step from the current status is offered; finishing shipping
/// needs at least one tracking update.
pub fn available_actions(status: &OrderStatus, tracking_count: usize) -> Vec<ActionState> {
    match status {
        OrderStatus::Processing => vec![
            ActionState::enabled(OrderAction::Verify),
            ActionState::enabled(OrderAction::Cancel),
        ],
        OrderStatus::Verified => vec![
            ActionState::enabled(OrderAction::StartShipping),
            ActionState::enabled(OrderAction::Cancel),
        ],
        OrderStatus::Shipping => vec![
            ActionState::enabled(OrderAction::AddTracking),
            ActionState {
                action: OrderAction::EditTracking,
                enabled: tracking_count > 0,
            },
            ActionState {
                action: OrderAction::DeleteTracking,
                enabled: tracking_count > 0,
            },
            ActionState {
                action: OrderAction::FinishShipping,
                enabled: tracking_count > 0,
            },
        ],
        OrderStatus::Received => vec![ActionState::enabled(OrderAction::ConfirmReceipt)],
        OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Unknown(_) => Vec::new(),
    }
}

/// Whether `action` is offered and enabled for the given status.
pub fn is_action_enabled(status: &OrderStatus, tracking_count: usize, action: OrderAction) -> bool {
    available_actions(status, tracking_count)
        .iter()
        .any(|s| s.action == action && s.enabled)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(rename = "ProductID")]
    pub product_id: ProductId,
    #[serde(rename = "ProductName", default)]
    pub product_name: String,
    #[serde(rename = "VariantID", default)]
    pub variant_id: Option<String>,
    #[serde(rename = "Quantity")]
    pub quantity: u32,
    /// Unit price in minor units.
    #[serde(rename = "UnitPrice")]
    pub unit_price: u64,
}

/// A customer's pre-order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "OrderID")]
    pub id: OrderId,
    #[serde(rename = "OrderStatus")]
    pub status: OrderStatus,
    #[serde(rename = "OrderDate")]
    pub ordered_at: DateTime<Utc>,
    #[serde(rename = "VerifiedAt", default)]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(rename = "ShippingAt", default)]
    pub shipping_at: Option<DateTime<Utc>>,
    #[serde(rename = "ReceivedAt", default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(rename = "CompletedAt", default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Amounts in minor units.
    #[serde(rename = "TotalAmount")]
    pub total_amount: u64,
    #[serde(rename = "ShippingCharge", default)]
    pub shipping_charge: u64,
    #[serde(rename = "FinalPrice")]
    pub final_price: u64,
    #[serde(rename = "Items", default)]
    pub items: Vec<OrderItem>,
}

/// One stage of an order's history, as displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineStage {
    pub label: &'static str,
    pub reached_at: Option<DateTime<Utc>>,
    pub current: bool,
}

impl Order {
    /// Lifecycle labels in order, with the time each stage was reached.
    pub fn timeline(&self) -> Vec<TimelineStage> {
        let stages = [
            (OrderStatus::Processing, Some(self.ordered_at)),
            (OrderStatus::Verified, self.verified_at),
            (OrderStatus::Shipping, self.shipping_at),
            (OrderStatus::Received, self.received_at),
            (OrderStatus::Completed, self.completed_at),
        ];
        stages
            .into_iter()
            .map(|(status, reached_at)| TimelineStage {
                current: status == self.status,
                label: match status {
                    OrderStatus::Processing => "Processing",
                    OrderStatus::Verified => "Verified",
                    OrderStatus::Shipping => "Shipping",
                    OrderStatus::Received => "Received",
                    _ => "Completed",
                },
                reached_at,
            })
            .collect()
    }

    pub fn computed_final_price(&self) -> u64 {
        self.total_amount.saturating_add(self.shipping_charge)
    }

    /// True when the server's final price disagrees with total + shipping.
    pub fn has_price_mismatch(&self) -> bool {
        self.final_price != self.computed_final_price()
    }
}

// ---------- Tracking ----------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    #[serde(rename = "TrackingID")]
    pub id: TrackingId,
    #[serde(rename = "TrackingStatus")]
    pub status: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "TimeStamp")]
    pub timestamp: DateTime<Utc>,
}

/// Body for creating or editing a tracking update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingDraft {
    #[serde(rename = "TrackingStatus")]
    pub status: String,
    #[serde(rename = "Location")]
    pub location: String,
}

impl TrackingDraft {
    /// Both fields must be non-blank.
    pub fn is_complete(&self) -> bool {
        !self.status.trim().is_empty() && !self.location.trim().is_empty()
    }
}

/// Tracking updates of one order, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingLog {
    updates: Vec<TrackingUpdate>,
}

impl TrackingLog {
    pub fn from_updates(mut updates: Vec<TrackingUpdate>) -> Self {
        updates.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Self { updates }
    }

    pub fn updates(&self) -> &[TrackingUpdate] {
        &self.updates
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn latest(&self) -> Option<&TrackingUpdate> {
        self.updates.last()
    }

    pub fn push(&mut self, update: TrackingUpdate) {
        let pos = self
            .updates
            .partition_point(|u| u.timestamp <= update.timestamp);
        self.updates.insert(pos, update);
    }

    /// Replace the entry with the same id. Returns `false` if no such entry.
    pub fn replace(&mut self, update: TrackingUpdate) -> bool {
        match self.updates.iter_mut().find(|u| u.id == update.id) {
            Some(slot) => {
                *slot = update;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &TrackingId) -> Option<TrackingUpdate> {
        let pos = self.updates.iter().position(|u| &u.id == id)?;
        Some(self.updates.remove(pos))
    }
}
