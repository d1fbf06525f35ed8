//! HTTP handlers for the public surface enumerated in spec §6. Each module
//! covers one row (or a closely related group of rows) of that table.

pub mod admin;
pub mod api_keys;
pub mod balance;
pub mod payment;
pub mod usage;
pub mod webhooks;
