//! Staff-only endpoints. Every call carries the bearer token; the backend
//! decides whether the caller may make it.

use reqwest::Method;
use serde::Serialize;

use modelshop_common::identity::{Customer, Employee, EmployeeDraft};
use modelshop_common::order::{Order, OrderAction, OrderId, TrackingDraft, TrackingId, TrackingUpdate};
use modelshop_common::product::{ProductId, Review, ReviewStatus};

use crate::api::{ApiClient, Auth};
use crate::error::ApiError;

#[derive(Serialize)]
struct StockUpdate {
    #[serde(rename = "Stock")]
    stock: u32,
}

#[derive(Serialize)]
struct ReviewDecision {
    #[serde(rename = "Status")]
    status: ReviewStatus,
}

/// Path segment of a status transition, for the actions that are one.
fn transition_segment(action: OrderAction) -> Option<&'static str> {
    match action {
        OrderAction::Verify => Some("verify"),
        OrderAction::Cancel => Some("cancel"),
        OrderAction::StartShipping => Some("start-shipping"),
        OrderAction::FinishShipping => Some("finish-shipping"),
        OrderAction::ConfirmReceipt
        | OrderAction::AddTracking
        | OrderAction::EditTracking
        | OrderAction::DeleteTracking => None,
    }
}

impl ApiClient {
    pub async fn all_orders(&self, status: Option<&str>) -> Result<Vec<Order>, ApiError> {
        let mut rb = self.request(Method::GET, "/api/admin/orders", Auth::Bearer)?;
        if let Some(status) = status {
            rb = rb.query(&[("status", status)]);
        }
        self.send_json(rb).await
    }

    /// Ask the backend to move an order along. The response body is ignored;
    /// callers re-read the order to learn the resulting status.
    pub async fn transition_order(&self, id: &OrderId, action: OrderAction) -> Result<(), ApiError> {
        if action == OrderAction::ConfirmReceipt {
            return self.confirm_received(id).await;
        }
        let segment = transition_segment(action)
            .ok_or_else(|| ApiError::Invalid(format!("{} is not a status change", action.label())))?;
        let path = format!("/api/admin/orders/{id}/{segment}");
        tracing::debug!(order = %id, ?action, "Order transition");
        self.send_unit(self.request(Method::POST, &path, Auth::Bearer)?)
            .await
    }

    pub async fn add_tracking(&self, id: &OrderId, draft: &TrackingDraft) -> Result<TrackingUpdate, ApiError> {
        let path = format!("/api/admin/orders/{id}/tracking");
        self.send_json(self.request(Method::POST, &path, Auth::Bearer)?.json(draft))
            .await
    }

    pub async fn update_tracking(
        &self,
        id: &OrderId,
        tracking: &TrackingId,
        draft: &TrackingDraft,
    ) -> Result<(), ApiError> {
        let path = format!("/api/admin/orders/{id}/tracking/{}", tracking.0);
        self.send_unit(self.request(Method::PUT, &path, Auth::Bearer)?.json(draft))
            .await
    }

    pub async fn delete_tracking(&self, id: &OrderId, tracking: &TrackingId) -> Result<(), ApiError> {
        let path = format!("/api/admin/orders/{id}/tracking/{}", tracking.0);
        self.send_unit(self.request(Method::DELETE, &path, Auth::Bearer)?)
            .await
    }

    pub async fn update_stock(&self, product: &ProductId, stock: u32) -> Result<(), ApiError> {
        let path = format!("/api/admin/products/{product}/stock");
        self.send_unit(
            self.request(Method::PUT, &path, Auth::Bearer)?
                .json(&StockUpdate { stock }),
        )
        .await
    }

    pub async fn reviews_for_moderation(&self, status: ReviewStatus) -> Result<Vec<Review>, ApiError> {
        let status = match status {
            ReviewStatus::Pending => "Pending",
            ReviewStatus::Approved => "Approved",
            ReviewStatus::Rejected => "Rejected",
        };
        let rb = self
            .request(Method::GET, "/api/admin/reviews", Auth::Bearer)?
            .query(&[("status", status)]);
        self.send_json(rb).await
    }

    pub async fn moderate_review(&self, review_id: &str, status: ReviewStatus) -> Result<(), ApiError> {
        if status == ReviewStatus::Pending {
            return Err(ApiError::Invalid("a review can only be approved or rejected".into()));
        }
        let path = format!("/api/admin/reviews/{review_id}");
        self.send_unit(
            self.request(Method::PUT, &path, Auth::Bearer)?
                .json(&ReviewDecision { status }),
        )
        .await
    }

    pub async fn employees(&self) -> Result<Vec<Employee>, ApiError> {
        self.send_json(self.request(Method::GET, "/api/admin/employees", Auth::Bearer)?)
            .await
    }

    pub async fn create_employee(&self, draft: &EmployeeDraft) -> Result<Employee, ApiError> {
        check_draft(draft)?;
        if draft.password.as_deref().map_or(true, str::is_empty) {
            return Err(ApiError::Invalid("a new account needs a password".into()));
        }
        self.send_json(
            self.request(Method::POST, "/api/admin/employees", Auth::Bearer)?
                .json(draft),
        )
        .await
    }

    pub async fn update_employee(&self, id: &str, draft: &EmployeeDraft) -> Result<(), ApiError> {
        check_draft(draft)?;
        let path = format!("/api/admin/employees/{id}");
        self.send_unit(self.request(Method::PUT, &path, Auth::Bearer)?.json(draft))
            .await
    }

    pub async fn delete_employee(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/api/admin/employees/{id}");
        self.send_unit(self.request(Method::DELETE, &path, Auth::Bearer)?)
            .await
    }

    pub async fn customers(&self) -> Result<Vec<Customer>, ApiError> {
        self.send_json(self.request(Method::GET, "/api/admin/customers", Auth::Bearer)?)
            .await
    }
}

fn check_draft(draft: &EmployeeDraft) -> Result<(), ApiError> {
    match draft.problems().as_slice() {
        [] => Ok(()),
        problems => Err(ApiError::Invalid(problems.join(", "))),
    }
}
