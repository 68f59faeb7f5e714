//! Plain-text rendering for terminal output.

use chrono::{DateTime, Local, Utc};
use modelshop_common::chat::{ChatMessage, ChatSession, ChatStats, SenderType};
use modelshop_common::currency::{format_amount, Currency, RateTable};
use modelshop_common::order::{ActionState, Order, TrackingLog};
use modelshop_common::product::{Product, Review};

pub struct Prices {
    pub currency: Currency,
    pub rates: RateTable,
}

impl Prices {
    pub fn base() -> Self {
        Self {
            currency: Currency::default(),
            rates: RateTable::default(),
        }
    }

    pub fn show(&self, minor: u64) -> String {
        format_amount(minor, self.currency, &self.rates)
    }
}

fn when(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub fn product_line(p: &Product, prices: &Prices) -> String {
    let stock = if p.in_stock() {
        format!("{} in stock", p.stock)
    } else {
        "sold out".to_string()
    };
    let rating = p
        .average_rating
        .map(|r| format!("  ★{r:.1}"))
        .unwrap_or_default();
    format!("{:<12} {:<32} {:>12}  {stock}{rating}", p.id.0, p.name, prices.show(p.price))
}

pub fn review_line(r: &Review) -> String {
    format!(
        "{} {}{} {}: {}",
        r.id,
        "★".repeat(r.rating as usize),
        "☆".repeat(5usize.saturating_sub(r.rating as usize)),
        r.username,
        r.comment
    )
}

pub fn order_line(o: &Order, prices: &Prices) -> String {
    format!(
        "{:<12} {:<11} {}  {}",
        o.id.0,
        o.status.as_str(),
        when(o.ordered_at),
        prices.show(o.final_price)
    )
}

pub fn order_detail(order: &Order, tracking: &TrackingLog, actions: &[ActionState], prices: &Prices) -> String {
    let mut out = vec![format!("Order {}  [{}]", order.id, order.status)];
    for stage in order.timeline() {
        let mark = if stage.current {
            "▶"
        } else if stage.reached_at.is_some() {
            "✓"
        } else {
            " "
        };
        let at = stage.reached_at.map(when).unwrap_or_default();
        out.push(format!("  {mark} {:<10} {at}", stage.label));
    }
    for item in &order.items {
        out.push(format!(
            "  {} x{} @ {}",
            if item.product_name.is_empty() {
                item.product_id.to_string()
            } else {
                item.product_name.clone()
            },
            item.quantity,
            prices.show(item.unit_price)
        ));
    }
    out.push(format!(
        "  Total {}  Shipping {}  Final {}",
        prices.show(order.total_amount),
        prices.show(order.shipping_charge),
        prices.show(order.final_price)
    ));
    if order.has_price_mismatch() {
        out.push("  (final price differs from total plus shipping)".to_string());
    }
    if !tracking.is_empty() {
        out.push("  Tracking:".to_string());
        for u in tracking.updates() {
            out.push(format!("    {} {} {} @ {}", u.id.0, when(u.timestamp), u.status, u.location));
        }
    }
    if !actions.is_empty() {
        let labels: Vec<String> = actions
            .iter()
            .map(|a| {
                if a.enabled {
                    a.action.label().to_string()
                } else {
                    format!("({})", a.action.label())
                }
            })
            .collect();
        out.push(format!("  Actions: {}", labels.join(", ")));
    }
    out.join("\n")
}

pub fn chat_line(m: &ChatMessage) -> String {
    let who = match m.sender_type {
        SenderType::User => m.sender_name.as_str(),
        SenderType::Admin if m.sender_name.is_empty() => "Support",
        SenderType::Admin => m.sender_name.as_str(),
        SenderType::Bot => "Bot",
    };
    format!("[{}] {who}: {}", when(m.timestamp), m.text)
}

pub fn session_line(s: &ChatSession) -> String {
    let last = s.last_message.as_deref().unwrap_or("");
    let at = s.last_message_at.map(when).unwrap_or_default();
    format!("{:<14} {:<16} {at:<16} {last}", s.id.0, s.username)
}

pub fn stats_line(s: &ChatStats) -> String {
    format!(
        "{} active, {} awaiting reply, {} messages today",
        s.active_sessions, s.awaiting_reply, s.messages_today
    )
}
