//! Customer-facing endpoints: catalogue, cart, pre-orders, reviews and rates.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use modelshop_common::cart::{Cart, CartKind, CartLine};
use modelshop_common::currency::RateTable;
use modelshop_common::order::{Order, OrderId, TrackingLog, TrackingUpdate};
use modelshop_common::product::{Product, ProductId, Review, ReviewDraft, Variant};

use crate::api::{ApiClient, Auth};
use crate::error::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct NewCartLine {
    #[serde(rename = "ProductID")]
    pub product_id: ProductId,
    #[serde(rename = "VariantID", skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(rename = "Quantity")]
    pub quantity: u32,
    #[serde(rename = "Kind")]
    pub kind: CartKind,
}

impl NewCartLine {
    pub fn new(product_id: ProductId, variant_id: Option<String>, kind: CartKind, quantity: i64) -> Self {
        Self {
            product_id,
            variant_id,
            quantity: kind.clamp(quantity),
            kind,
        }
    }
}

#[derive(Serialize)]
struct QuantityUpdate {
    #[serde(rename = "Quantity")]
    quantity: u32,
}

/// Body of a pre-order placed from the cart.
#[derive(Debug, Clone, Serialize)]
pub struct PreorderRequest {
    #[serde(rename = "UserID")]
    pub user_id: String,
    #[serde(rename = "CartIDs")]
    pub cart_line_ids: Vec<String>,
    #[serde(rename = "ShippingAddress")]
    pub shipping_address: String,
    #[serde(rename = "PhoneNumber")]
    pub phone: String,
}

/// An order with its tracking history.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDetail {
    pub order: Order,
    pub tracking: TrackingLog,
}

#[derive(Deserialize)]
pub(crate) struct OrderDetailBody {
    order: Order,
    #[serde(default)]
    tracking: Vec<TrackingUpdate>,
}

impl From<OrderDetailBody> for OrderDetail {
    fn from(body: OrderDetailBody) -> Self {
        Self {
            order: body.order,
            tracking: TrackingLog::from_updates(body.tracking),
        }
    }
}

impl ApiClient {
    pub async fn products(&self) -> Result<Vec<Product>, ApiError> {
        self.send_json(self.request(Method::GET, "/api/products", Auth::Public)?)
            .await
    }

    pub async fn product(&self, id: &ProductId) -> Result<Product, ApiError> {
        let path = format!("/api/products/{id}");
        self.send_json(self.request(Method::GET, &path, Auth::Public)?)
            .await
    }

    pub async fn variants(&self, id: &ProductId) -> Result<Vec<Variant>, ApiError> {
        let path = format!("/api/products/{id}/variants");
        self.send_json(self.request(Method::GET, &path, Auth::Public)?)
            .await
    }

    pub async fn reviews(&self, id: &ProductId) -> Result<Vec<Review>, ApiError> {
        let path = format!("/api/products/{id}/reviews");
        self.send_json(self.request(Method::GET, &path, Auth::Public)?)
            .await
    }

    pub async fn submit_review(&self, id: &ProductId, draft: &ReviewDraft) -> Result<(), ApiError> {
        let path = format!("/api/products/{id}/reviews");
        self.send_unit(self.request(Method::POST, &path, Auth::Bearer)?.json(draft))
            .await
    }

    /// The signed-in user's cart, quantities pulled back into range.
    pub async fn cart(&self) -> Result<Cart, ApiError> {
        let path = format!("/api/cart/{}", self.require_user_id()?);
        let mut lines: Vec<CartLine> = self
            .send_json(self.request(Method::GET, &path, Auth::Bearer)?)
            .await?;
        lines.iter_mut().for_each(CartLine::normalize);
        Ok(Cart { lines })
    }

    pub async fn add_to_cart(&self, line: &NewCartLine) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::POST, "/api/cart", Auth::Bearer)?.json(line))
            .await
    }

    /// Store a line's quantity. The line is expected to have been clamped already.
    pub async fn update_cart_line(&self, line: &CartLine) -> Result<(), ApiError> {
        let path = format!("/api/cart/{}", line.id);
        let body = QuantityUpdate {
            quantity: line.quantity(),
        };
        self.send_unit(self.request(Method::PUT, &path, Auth::Bearer)?.json(&body))
            .await
    }

    pub async fn remove_cart_line(&self, line_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/cart/{line_id}");
        self.send_unit(self.request(Method::DELETE, &path, Auth::Bearer)?)
            .await
    }

    pub async fn place_preorder(&self, request: &PreorderRequest) -> Result<Order, ApiError> {
        if request.cart_line_ids.is_empty() {
            return Err(ApiError::Invalid("cart is empty".into()));
        }
        if request.shipping_address.trim().is_empty() {
            return Err(ApiError::Invalid("shipping address is required".into()));
        }
        let order: Order = self
            .send_json(self.request(Method::POST, "/api/orders", Auth::Bearer)?.json(request))
            .await?;
        tracing::info!(order = %order.id, "Pre-order placed");
        Ok(order)
    }

    pub async fn my_orders(&self) -> Result<Vec<Order>, ApiError> {
        let path = format!("/api/orders/user/{}", self.require_user_id()?);
        self.send_json(self.request(Method::GET, &path, Auth::Bearer)?)
            .await
    }

    pub async fn order_detail(&self, id: &OrderId) -> Result<OrderDetail, ApiError> {
        let path = format!("/api/orders/{id}");
        let body: OrderDetailBody = self
            .send_json(self.request(Method::GET, &path, Auth::Bearer)?)
            .await?;
        Ok(body.into())
    }

    pub async fn confirm_received(&self, id: &OrderId) -> Result<(), ApiError> {
        let path = format!("/api/orders/{id}/received");
        self.send_unit(self.request(Method::POST, &path, Auth::Bearer)?)
            .await
    }

    /// Exchange rates from the configured lookup; an empty table when none is configured.
    pub async fn exchange_rates(&self) -> Result<RateTable, ApiError> {
        let Some(url) = self.config().rates_url.clone() else {
            return Ok(RateTable::default());
        };
        self.send_json(self.external(&url)).await
    }
}
