//! Shared types for the recharge platform
//!
//! Domain models, status enums and utility helpers used by the
//! recharge server and its tooling.

pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use models::order::{Order, OrderOrigin, OrderStatus, UsedApiSet};
pub use models::platform::CallbackData;
