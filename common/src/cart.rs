use serde::{Deserialize, Serialize};

use crate::product::ProductId;

/// Which cart a line belongs to. Each kind bounds its quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartKind {
    /// Regular catalogue products.
    Product,
    /// Custom variants requested from the shop.
    RequestedVariant,
}

impl CartKind {
    pub const MIN_QUANTITY: u32 = 1;

    pub fn max_quantity(self) -> u32 {
        match self {
            CartKind::Product => 10,
            CartKind::RequestedVariant => 50,
        }
    }

    pub fn clamp(self, quantity: i64) -> u32 {
        quantity.clamp(Self::MIN_QUANTITY as i64, self.max_quantity() as i64) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(rename = "CartID")]
    pub id: String,
    #[serde(rename = "ProductID")]
    pub product_id: ProductId,
    #[serde(rename = "ProductName", default)]
    pub product_name: String,
    #[serde(rename = "VariantID", default)]
    pub variant_id: Option<String>,
    #[serde(rename = "Quantity")]
    quantity: u32,
    /// Unit price in minor units.
    #[serde(rename = "UnitPrice")]
    pub unit_price: u64,
    #[serde(rename = "Kind")]
    pub kind: CartKind,
}

impl CartLine {
    pub fn new(
        id: impl Into<String>,
        product_id: ProductId,
        kind: CartKind,
        quantity: i64,
        unit_price: u64,
    ) -> Self {
        Self {
            id: id.into(),
            product_id,
            product_name: String::new(),
            variant_id: None,
            quantity: kind.clamp(quantity),
            unit_price,
            kind,
        }
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Pull a quantity that came from the server back into bounds.
    pub fn normalize(&mut self) {
        self.quantity = self.kind.clamp(self.quantity as i64);
    }

    pub fn increment(&mut self) -> u32 {
        self.quantity = self.kind.clamp(self.quantity as i64 + 1);
        self.quantity
    }

    pub fn decrement(&mut self) -> u32 {
        self.quantity = self.kind.clamp(self.quantity as i64 - 1);
        self.quantity
    }

    /// Set the quantity from free-text input. Input that is not a number sets the minimum.
    pub fn set_from_input(&mut self, input: &str) -> u32 {
        let requested = input.trim().parse::<i64>().unwrap_or(CartKind::MIN_QUANTITY as i64);
        self.quantity = self.kind.clamp(requested);
        self.quantity
    }

    pub fn subtotal(&self) -> u64 {
        self.unit_price.saturating_mul(self.quantity as u64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn total(&self) -> u64 {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(CartLine::quantity).sum()
    }

    pub fn line_mut(&mut self, id: &str) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|l| l.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<CartLine> {
        let pos = self.lines.iter().position(|l| l.id == id)?;
        Some(self.lines.remove(pos))
    }
}
