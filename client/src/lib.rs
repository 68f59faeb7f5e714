pub mod api;
pub mod backoffice;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod order_desk;
pub mod scope;
pub mod sse;
pub mod storefront;

pub use api::ApiClient;
pub use config::{ChatTimings, ClientConfig};
pub use context::AppContext;
pub use error::{ApiError, StreamError};
pub use order_desk::{AutoConfirm, Confirmer, OrderDesk};
pub use storefront::OrderDetail;
