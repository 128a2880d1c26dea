//! External service adapters: payment provider and notifications.

pub mod notification;
pub mod payment;
