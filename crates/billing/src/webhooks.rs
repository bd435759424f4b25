//! Stripe webhook handling
//!
//! Verifies event signatures and applies idempotent plan transitions.
//! Every provider event becomes exactly one `payment_events` row, claimed
//! atomically so concurrent deliveries of the same event id cannot both
//! produce side effects.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{
    CheckoutSession, Customer, Event, EventObject, EventType, Expandable, Invoice, Subscription,
    Webhook,
};
use time::OffsetDateTime;
use uuid::Uuid;

use botlocal_shared::{PlanCatalog, PlanTier};

use crate::config::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::notifications::{NotificationCategory, NotificationService};

type HmacSha256 = Hmac<Sha256>;

/// Signatures older than this are rejected.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// An event stuck in `processing` longer than this is considered abandoned
/// (crash mid-processing) and may be re-claimed on redelivery.
pub const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    config: StripeConfig,
    pool: PgPool,
    notifications: NotificationService,
    catalog: PlanCatalog,
}

impl WebhookHandler {
    pub fn new(
        config: StripeConfig,
        pool: PgPool,
        notifications: NotificationService,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            config,
            pool,
            notifications,
            catalog,
        }
    }

    /// Verify and parse a Stripe webhook event.
    ///
    /// Uses the library verification first, with a manual HMAC fallback for
    /// payloads from newer Stripe API versions the library cannot parse
    /// strictly.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        match Webhook::construct_event(payload, signature, &self.config.webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        let now = OffsetDateTime::now_utc().unix_timestamp();
        verify_signature_at(payload, signature, &self.config.webhook_secret, now)?;

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Manual webhook verification succeeded"
        );
        Ok(event)
    }

    /// Handle a verified Stripe event.
    ///
    /// The INSERT...ON CONFLICT...RETURNING pattern atomically claims
    /// exclusive processing rights: only one concurrent delivery of an event
    /// id gets a row back. Rows that previously errored, or that have been
    /// stuck in `processing` past the timeout, are re-claimable so provider
    /// retries make progress; `processed` rows are terminal.
    pub async fn handle_event(&self, event: Event, payload: &str) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let event_type_str = event.type_.to_string();

        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO payment_events
                (stripe_event_id, event_type, status, processing_started_at, raw_event)
            VALUES ($1, $2, 'processing', NOW(), $3::jsonb)
            ON CONFLICT (stripe_event_id) DO UPDATE SET
                status = 'processing',
                processing_started_at = NOW(),
                error_message = NULL
            WHERE payment_events.status = 'error'
               OR (payment_events.status = 'processing'
                   AND payment_events.processing_started_at
                       < NOW() - ($4 * INTERVAL '1 minute'))
            RETURNING id
            "#,
        )
        .bind(&event_id)
        .bind(&event_type_str)
        .bind(payload)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            let existing_status: Option<(String,)> =
                sqlx::query_as("SELECT status FROM payment_events WHERE stripe_event_id = $1")
                    .bind(&event_id)
                    .fetch_optional(&self.pool)
                    .await
                    .ok()
                    .flatten();

            let reason = match existing_status {
                Some((status,)) if status == "processed" => "already processed",
                Some((status,)) if status == "processing" => {
                    "currently being processed by another worker"
                }
                Some(_) => "exists with another status",
                None => "unknown (race condition?)",
            };

            tracing::info!(
                event_id = %event_id,
                event_type = %event_type_str,
                reason = reason,
                "Duplicate webhook event - atomic idempotency check"
            );
            return Ok(());
        }

        tracing::info!(
            event_type = %event_type_str,
            event_id = %event_id,
            "Processing Stripe webhook event (claimed exclusive processing rights)"
        );

        let result = self.process_event_internal(event).await;

        let (status, error_message) = match &result {
            Ok(()) => ("processed", None),
            Err(e) => ("error", Some(e.to_string())),
        };

        let finalize = sqlx::query(
            "UPDATE payment_events SET status = $1, error_message = $2 WHERE stripe_event_id = $3",
        )
        .bind(status)
        .bind(&error_message)
        .bind(&event_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = finalize {
            // Retry once - the status row is what makes redelivery idempotent
            tracing::warn!(
                event_id = %event_id,
                error = %e,
                "First attempt to finalize webhook event failed, retrying..."
            );
            if let Err(retry_err) = sqlx::query(
                "UPDATE payment_events SET status = $1, error_message = $2 WHERE stripe_event_id = $3",
            )
            .bind(status)
            .bind(&error_message)
            .bind(&event_id)
            .execute(&self.pool)
            .await
            {
                tracing::error!(
                    event_id = %event_id,
                    status = status,
                    retry_error = %retry_err,
                    "Failed to finalize webhook event record after retry. \
                     Event may appear stuck in 'processing' state until the \
                     claim timeout elapses."
                );
            }
        }

        result
    }

    async fn process_event_internal(&self, event: Event) -> BillingResult<()> {
        match event.type_ {
            EventType::CheckoutSessionCompleted => self.handle_checkout_completed(event).await,
            EventType::CustomerSubscriptionDeleted => self.handle_subscription_deleted(event).await,
            EventType::InvoicePaymentFailed => self.handle_invoice_payment_failed(event).await,
            _ => {
                // Forward compatibility: unknown event types are acknowledged
                // and marked processed without side effects
                tracing::info!(
                    event_type = %event.type_,
                    event_id = %event.id,
                    "Received unhandled Stripe event type - no handler configured"
                );
                Ok(())
            }
        }
    }

    /// Checkout completed: upgrade the plan and bind the Stripe customer.
    ///
    /// The authoritative plan source is the checkout session's
    /// `metadata.plan` key, written by the dashboard when it creates the
    /// session. Price-id resolution is deliberately not consulted.
    async fn handle_checkout_completed(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let session = extract_checkout_session(event)?;
        let metadata = session.metadata.clone().unwrap_or_default();

        let business_id: Uuid = metadata
            .get("businessId")
            .ok_or(BillingError::MissingMetadata {
                event_id: event_id.clone(),
                field: "businessId",
            })?
            .parse()
            .map_err(|e| BillingError::InvalidMetadata {
                event_id: event_id.clone(),
                reason: format!("businessId is not a UUID: {e}"),
            })?;

        let plan: PlanTier = metadata
            .get("plan")
            .ok_or(BillingError::MissingMetadata {
                event_id: event_id.clone(),
                field: "plan",
            })?
            .parse()?;

        let stripe_customer = session.customer.as_ref().map(customer_ref);
        let spec = self.catalog.spec(plan);
        let amount_cents = session.amount_total.unwrap_or(spec.price_cents);

        let updated = sqlx::query(
            r#"
            UPDATE businesses
            SET plan = $1,
                stripe_customer_id = COALESCE($2, stripe_customer_id),
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(plan.as_str())
        .bind(&stripe_customer)
        .bind(business_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            tracing::warn!(
                event_id = %event_id,
                business_id = %business_id,
                "Checkout completed for unknown business - event marked processed"
            );
            return Ok(());
        }

        sqlx::query(
            "UPDATE payment_events SET business_id = $1, amount_cents = $2 WHERE stripe_event_id = $3",
        )
        .bind(business_id)
        .bind(amount_cents)
        .bind(&event_id)
        .execute(&self.pool)
        .await?;

        if let Err(e) = self
            .notifications
            .notify(
                business_id,
                NotificationCategory::Success,
                "Plan upgraded",
                &format!("Your subscription is now on the {} plan.", spec.name),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to record upgrade notification");
        }

        tracing::info!(
            business_id = %business_id,
            plan = plan.as_str(),
            "Business upgraded via checkout"
        );
        Ok(())
    }

    /// Subscription cancelled: downgrade to the lowest tier.
    async fn handle_subscription_deleted(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let subscription = extract_subscription(event)?;
        let stripe_customer = customer_ref(&subscription.customer);

        let business: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM businesses WHERE stripe_customer_id = $1")
                .bind(&stripe_customer)
                .fetch_optional(&self.pool)
                .await?;

        let Some((business_id,)) = business else {
            tracing::info!(
                event_id = %event_id,
                stripe_customer = %stripe_customer,
                "Subscription deleted for unbound customer - nothing to downgrade"
            );
            return Ok(());
        };

        let lowest = PlanTier::lowest();
        sqlx::query("UPDATE businesses SET plan = $1, updated_at = NOW() WHERE id = $2")
            .bind(lowest.as_str())
            .bind(business_id)
            .execute(&self.pool)
            .await?;

        sqlx::query("UPDATE payment_events SET business_id = $1 WHERE stripe_event_id = $2")
            .bind(business_id)
            .bind(&event_id)
            .execute(&self.pool)
            .await?;

        if let Err(e) = self
            .notifications
            .notify(
                business_id,
                NotificationCategory::Payment,
                "Subscription cancelled",
                &format!(
                    "Your subscription was cancelled and your plan moved to {}.",
                    self.catalog.spec(lowest).name
                ),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to record cancellation notification");
        }

        tracing::info!(
            business_id = %business_id,
            stripe_customer = %stripe_customer,
            "Subscription cancelled, downgraded to lowest tier"
        );
        Ok(())
    }

    /// Payment failed: notify the tenant, leave the plan untouched.
    async fn handle_invoice_payment_failed(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let invoice = extract_invoice(event)?;

        let Some(stripe_customer) = invoice.customer.as_ref().map(customer_ref) else {
            tracing::info!(event_id = %event_id, "Payment failed event without customer");
            return Ok(());
        };

        let business: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM businesses WHERE stripe_customer_id = $1")
                .bind(&stripe_customer)
                .fetch_optional(&self.pool)
                .await?;

        let Some((business_id,)) = business else {
            tracing::info!(
                event_id = %event_id,
                stripe_customer = %stripe_customer,
                "Payment failed for unbound customer"
            );
            return Ok(());
        };

        sqlx::query("UPDATE payment_events SET business_id = $1 WHERE stripe_event_id = $2")
            .bind(business_id)
            .bind(&event_id)
            .execute(&self.pool)
            .await?;

        self.notifications
            .notify(
                business_id,
                NotificationCategory::Error,
                "Payment failed",
                "Your latest payment failed. Please update your payment method to keep your plan active.",
            )
            .await?;

        tracing::warn!(
            business_id = %business_id,
            stripe_customer = %stripe_customer,
            "Invoice payment failed"
        );
        Ok(())
    }
}

/// Manual HMAC-SHA256 verification of a `Stripe-Signature` header.
///
/// Header format: `t=timestamp,v1=signature[,v0=signature]`. The signed
/// payload is `"{timestamp}.{body}"` keyed by the webhook secret (without
/// its `whsec_` prefix).
pub(crate) fn verify_signature_at(
    payload: &str,
    signature: &str,
    webhook_secret: &str,
    now: i64,
) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        tracing::error!("Missing timestamp in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let v1_signature = v1_signature.ok_or_else(|| {
        tracing::error!("Missing v1 signature in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::error!(
            timestamp = timestamp,
            now = now,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let secret_key = webhook_secret
        .strip_prefix("whsec_")
        .unwrap_or(webhook_secret);
    let signed_payload = format!("{timestamp}.{payload}");

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        tracing::error!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

fn extract_checkout_session(event: Event) -> BillingResult<CheckoutSession> {
    match event.data.object {
        EventObject::CheckoutSession(session) => Ok(session),
        _ => Err(BillingError::UnexpectedObject(event.type_.to_string())),
    }
}

fn extract_subscription(event: Event) -> BillingResult<Subscription> {
    match event.data.object {
        EventObject::Subscription(subscription) => Ok(subscription),
        _ => Err(BillingError::UnexpectedObject(event.type_.to_string())),
    }
}

fn extract_invoice(event: Event) -> BillingResult<Invoice> {
    match event.data.object {
        EventObject::Invoice(invoice) => Ok(invoice),
        _ => Err(BillingError::UnexpectedObject(event.type_.to_string())),
    }
}

fn customer_ref(customer: &Expandable<Customer>) -> String {
    match customer {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(customer) => customer.id.to_string(),
    }
}
