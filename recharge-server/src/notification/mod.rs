//! 终态通知分发
//!
//! 周期扫描待投递的通知记录，POST 到客户回调地址。投递失败累计
//! 尝试次数，达到上限转 Failed 不再投递。未配置回调地址的记录
//! 直接视为已送达。

use crate::db::repository::NotificationRepository;
use shared::models::notification::NotificationRecord;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DISPATCH_BATCH: i64 = 20;
const DELIVERY_TIMEOUT_SECS: u64 = 10;

pub struct NotificationDispatcher {
    notifications: NotificationRepository,
    client: reqwest::Client,
    max_attempts: i64,
}

impl NotificationDispatcher {
    pub fn new(pool: SqlitePool, max_attempts: i64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            notifications: NotificationRepository::new(pool),
            client,
            max_attempts,
        }
    }

    /// 投递一批待发通知，返回处理条数
    pub async fn dispatch_pending(&self) -> usize {
        let pending = match self.notifications.find_pending(DISPATCH_BATCH).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Failed to scan pending notifications");
                return 0;
            }
        };

        let mut handled = 0;
        for record in pending {
            self.dispatch_one(&record).await;
            handled += 1;
        }
        handled
    }

    async fn dispatch_one(&self, record: &NotificationRecord) {
        if record.notify_url.is_empty() {
            // 客户未配置回调，直接完结
            if let Err(e) = self.notifications.mark_sent(record.id).await {
                tracing::error!(notification_id = record.id, error = %e, "Failed to mark notification sent");
            }
            return;
        }

        let result = self
            .client
            .post(&record.notify_url)
            .header("Content-Type", "application/json")
            .body(record.payload.clone())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    notification_id = record.id,
                    order_id = record.order_id,
                    "Notification delivered"
                );
                if let Err(e) = self.notifications.mark_sent(record.id).await {
                    tracing::error!(notification_id = record.id, error = %e, "Failed to mark notification sent");
                }
            }
            Ok(response) => {
                self.record_failure(record, &format!("http status {}", response.status()))
                    .await;
            }
            Err(e) => {
                self.record_failure(record, &e.to_string()).await;
            }
        }
    }

    async fn record_failure(&self, record: &NotificationRecord, error: &str) {
        let attempts = record.attempt_count + 1;
        tracing::warn!(
            notification_id = record.id,
            order_id = record.order_id,
            attempts,
            error,
            "Notification delivery failed"
        );
        if let Err(e) = self
            .notifications
            .mark_attempt_failed(record.id, attempts, self.max_attempts, error)
            .await
        {
            tracing::error!(notification_id = record.id, error = %e, "Failed to record delivery failure");
        }
    }

    /// 周期分发 worker
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            "Notification dispatcher started"
        );
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.dispatch_pending().await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Notification dispatcher shutting down");
                    break;
                }
            }
        }
    }
}
