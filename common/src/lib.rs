pub mod auth;
pub mod cart;
pub mod chat;
pub mod currency;
pub mod identity;
pub mod order;
pub mod product;
