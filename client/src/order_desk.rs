//! Staff view of a single order: status actions and tracking history.

use modelshop_common::order::{
    available_actions, is_action_enabled, ActionState, OrderAction, OrderId, OrderStatus,
    TrackingDraft, TrackingId, TrackingLog,
};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::storefront::OrderDetail;

/// Asks the operator before a status change goes out.
pub trait Confirmer {
    fn confirm(&self, action: OrderAction, order: &OrderId) -> bool;
}

impl<F> Confirmer for F
where
    F: Fn(OrderAction, &OrderId) -> bool,
{
    fn confirm(&self, action: OrderAction, order: &OrderId) -> bool {
        self(action, order)
    }
}

/// Confirms everything. For scripted use.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn confirm(&self, _: OrderAction, _: &OrderId) -> bool {
        true
    }
}

pub struct OrderDesk {
    api: ApiClient,
    order_id: OrderId,
    detail: Option<OrderDetail>,
}

impl OrderDesk {
    pub fn new(api: ApiClient, order_id: OrderId) -> Self {
        Self {
            api,
            order_id,
            detail: None,
        }
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    /// Re-read the order and its tracking list.
    pub async fn load(&mut self) -> Result<&OrderDetail, ApiError> {
        let detail = self.api.order_detail(&self.order_id).await?;
        tracing::debug!(order = %self.order_id, status = %detail.order.status, "Order loaded");
        Ok(self.detail.insert(detail))
    }

    pub fn detail(&self) -> Option<&OrderDetail> {
        self.detail.as_ref()
    }

    /// Buttons for the loaded order. Empty until [`load`](Self::load) succeeds.
    pub fn actions(&self) -> Vec<ActionState> {
        match &self.detail {
            Some(d) => available_actions(&d.order.status, d.tracking.len()),
            None => Vec::new(),
        }
    }

    /// Run a status change. The result is whatever status the server reports afterwards.
    pub async fn perform<C>(&mut self, action: OrderAction, confirmer: &C) -> Result<OrderStatus, ApiError>
    where
        C: Confirmer + ?Sized,
    {
        if !action.changes_status() {
            return Err(ApiError::Invalid(format!("{} is not a status change", action.label())));
        }
        self.ensure_enabled(action)?;
        if !confirmer.confirm(action, &self.order_id) {
            tracing::debug!(order = %self.order_id, ?action, "Action declined");
            return Err(ApiError::Declined);
        }
        self.api.transition_order(&self.order_id, action).await?;
        tracing::info!(order = %self.order_id, ?action, "Order action sent");
        Ok(self.load().await?.order.status.clone())
    }

    pub async fn add_tracking(&mut self, draft: &TrackingDraft) -> Result<(), ApiError> {
        self.ensure_enabled(OrderAction::AddTracking)?;
        check_tracking(draft)?;
        let update = self.api.add_tracking(&self.order_id, draft).await?;
        tracing::debug!(order = %self.order_id, tracking = %update.id.0, "Tracking update added");
        self.tracking_mut()?.push(update);
        Ok(())
    }

    pub async fn edit_tracking(&mut self, tracking: &TrackingId, draft: &TrackingDraft) -> Result<(), ApiError> {
        self.ensure_enabled(OrderAction::EditTracking)?;
        self.ensure_known(tracking)?;
        check_tracking(draft)?;
        self.api.update_tracking(&self.order_id, tracking, draft).await?;
        let log = self.tracking_mut()?;
        if let Some(mut update) = log.updates().iter().find(|u| &u.id == tracking).cloned() {
            update.status = draft.status.trim().to_string();
            update.location = draft.location.trim().to_string();
            log.replace(update);
        }
        Ok(())
    }

    pub async fn delete_tracking<C>(&mut self, tracking: &TrackingId, confirmer: &C) -> Result<(), ApiError>
    where
        C: Confirmer + ?Sized,
    {
        self.ensure_enabled(OrderAction::DeleteTracking)?;
        self.ensure_known(tracking)?;
        if !confirmer.confirm(OrderAction::DeleteTracking, &self.order_id) {
            return Err(ApiError::Declined);
        }
        self.api.delete_tracking(&self.order_id, tracking).await?;
        self.tracking_mut()?.remove(tracking);
        Ok(())
    }

    fn tracking_mut(&mut self) -> Result<&mut TrackingLog, ApiError> {
        self.detail
            .as_mut()
            .map(|d| &mut d.tracking)
            .ok_or_else(|| ApiError::Invalid("order not loaded".into()))
    }

    fn ensure_enabled(&self, action: OrderAction) -> Result<(), ApiError> {
        let detail = self
            .detail
            .as_ref()
            .ok_or_else(|| ApiError::Invalid("order not loaded".into()))?;
        if is_action_enabled(&detail.order.status, detail.tracking.len(), action) {
            Ok(())
        } else {
            Err(ApiError::ActionUnavailable {
                action,
                status: detail.order.status.to_string(),
            })
        }
    }

    fn ensure_known(&self, tracking: &TrackingId) -> Result<(), ApiError> {
        let known = self
            .detail
            .as_ref()
            .is_some_and(|d| d.tracking.updates().iter().any(|u| &u.id == tracking));
        if known {
            Ok(())
        } else {
            Err(ApiError::Invalid(format!("no tracking update {}", tracking.0)))
        }
    }
}

fn check_tracking(draft: &TrackingDraft) -> Result<(), ApiError> {
    if draft.is_complete() {
        Ok(())
    } else {
        Err(ApiError::Invalid("status and location are required".into()))
    }
}
