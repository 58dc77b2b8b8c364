//! Domain models (充值订单域)
//!
//! 所有与数据库表一一对应的实体都放在这里，`db` feature 打开时
//! 附带 `sqlx::FromRow` 派生，供 recharge-server 的仓储层直接使用。

pub mod balance_log;
pub mod callback_log;
pub mod notification;
pub mod order;
pub mod platform;
pub mod product;
pub mod retry;
pub mod user;

pub use balance_log::{BalanceDirection, BalanceLog, BalanceStyle};
pub use callback_log::CallbackLog;
pub use notification::{NotificationRecord, NotificationStatus};
pub use order::{Order, OrderOrigin, OrderStatus, UsedApiSet};
pub use platform::{CallbackData, PlatformAccount, PlatformApi, PlatformApiParam};
pub use product::{Product, ProductApiRelation};
pub use retry::{RetryRecord, RetryStatus, RetryType};
pub use user::User;
