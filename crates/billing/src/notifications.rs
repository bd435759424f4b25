//! Tenant notifications
//!
//! The pipeline only writes notification records; the dashboard reads them
//! and flips the `read` flag.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    Success,
    Error,
    Payment,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Success => "success",
            NotificationCategory::Error => "error",
            NotificationCategory::Payment => "payment",
        }
    }
}

#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
}

impl NotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn notify(
        &self,
        business_id: Uuid,
        category: NotificationCategory,
        title: &str,
        message: &str,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (business_id, category, title, message)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(business_id)
        .bind(category.as_str())
        .bind(title)
        .bind(message)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            business_id = %business_id,
            category = category.as_str(),
            title = title,
            "Notification recorded"
        );
        Ok(())
    }
}
