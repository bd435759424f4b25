//! Reply orchestrator
//!
//! Two stages per turn: booking-intent extraction (JSON mode) and grounded
//! reply generation. Extraction failures degrade to a normal reply; a
//! generation failure propagates so the pipeline substitutes the fixed
//! fallback text.

use sqlx::PgPool;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use uuid::Uuid;

use crate::chat::llm::{ChatMessage, GroqClient};
use crate::chat::store::{MessageRole, TurnMessage};
use crate::chat::types::Business;
use crate::chat::ChatError;

/// Sent when reply generation fails entirely.
pub const FALLBACK_REPLY: &str =
    "I am currently experiencing technical difficulties. Please contact the business directly by phone!";

/// Sent once when a turn is denied by the plan quota.
pub const LIMIT_REACHED_REPLY: &str =
    "Please contact the business directly. (Message limit reached)";

/// Structured judgment returned by the extraction stage.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingExtraction {
    pub is_booking_intent: bool,
    pub customer_name: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub service_type: Option<String>,
}

/// What the extraction implies for this turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingDecision {
    /// Intent plus a concrete date and time: create a pending booking.
    Create {
        customer_name: String,
        date: String,
        time: String,
        service_type: String,
    },
    /// Intent but no usable date or time: ask a clarifying question.
    AskForDateTime,
    NoIntent,
}

/// Total decision function over an extraction. Blank strings count as
/// missing, so the model cannot force a booking with empty fields.
pub(crate) fn decide_booking(extraction: &BookingExtraction) -> BookingDecision {
    if !extraction.is_booking_intent {
        return BookingDecision::NoIntent;
    }

    let date = extraction
        .date
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let time = extraction
        .time
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match (date, time) {
        (Some(date), Some(time)) => BookingDecision::Create {
            customer_name: extraction
                .customer_name
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Customer".to_string()),
            date: date.to_string(),
            time: time.to_string(),
            service_type: extraction
                .service_type
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "General Service".to_string()),
        },
        _ => BookingDecision::AskForDateTime,
    }
}

fn industry_directive(industry: &str) -> &'static str {
    match industry {
        "Restaurant" => {
            "Focus on menu availability, reservation times, dietary options, and restaurant ambiance. Encourage users to book a table for dining."
        }
        "Retail" => {
            "Focus on product availability, store locations, return policies, and current promotions. Help customers find what they are looking for in your inventory."
        }
        "Medical" => {
            "Focus on appointment scheduling, clinic hours, and accepted insurance. IMPORTANT: Do not provide any medical advice. Always refer health concerns to the professional staff."
        }
        "Home Services" => {
            "Focus on service quotes, emergency availability, service areas, and technician scheduling. Emphasize reliability and professional expertise."
        }
        _ => {
            "Provide helpful, general assistance based on the business information provided. Be professional and efficient."
        }
    }
}

/// Render history the way the prompts expect it.
fn format_history(history: &[TurnMessage]) -> String {
    history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                MessageRole::Customer => "Customer",
                MessageRole::Assistant => "AI Assistant",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn extraction_prompt(history: &str, incoming: &str) -> String {
    format!(
        r#"Analyze the following conversation and extract booking details.
Return ONLY valid JSON in this exact format:
{{
  "isBookingIntent": true/false (true if they actively want to book an appointment right now),
  "customerName": "name or null",
  "date": "specific requested date or null",
  "time": "specific requested time or null",
  "serviceType": "service requested or null"
}}

Previous Conversation:
{history}

Customer: {incoming}"#
    )
}

fn system_prompt(business: &Business, context: &str, history: &str) -> String {
    let industry = business.industry.as_deref().unwrap_or("General");
    let personality = business
        .bot_personality
        .as_deref()
        .unwrap_or("Friendly and helpful");
    let instructions = business.custom_instructions.as_deref().unwrap_or("");

    format!(
        r#"You are a helpful customer service AI assistant for a local business named "{name}".
This business operates in the {industry} industry.

Your Industry Focus:
{directive}

Your Personality:
{personality}

Custom Business Rules/Instructions:
{instructions}

Your only source of knowledge is the context provided below.
If a customer asks a question outside of this context, gently reply: "Please contact us directly."
Keep your replies short and natural, like a real person texting.
IMPORTANT: You must automatically detect the language the customer is writing in, and ALWAYS reply in that exact same language!

Knowledge Base Context:
{context}

Previous Conversation:
{history}"#,
        name = business.name,
        directive = industry_directive(industry),
    )
}

#[derive(Debug, Clone)]
pub struct ReplyOutcome {
    pub reply_text: String,
    pub booking_created: bool,
}

pub struct ReplyOrchestrator {
    llm: GroqClient,
    pool: PgPool,
}

impl ReplyOrchestrator {
    pub fn new(llm: GroqClient, pool: PgPool) -> Self {
        Self { llm, pool }
    }

    /// Produce the reply for one accepted turn.
    ///
    /// `history` is the conversation before `incoming`, oldest first.
    pub async fn generate(
        &self,
        business: &Business,
        customer_id: &str,
        history: &[TurnMessage],
        incoming: &str,
    ) -> Result<ReplyOutcome, ChatError> {
        let history_str = format_history(history);

        // Stage 1: intent extraction. LLM or parse failures degrade to a
        // bookingless turn; persistence failures are real errors.
        let (booking_created, booking_notice) =
            match self.extract_intent(&history_str, incoming).await {
                Ok(extraction) => match decide_booking(&extraction) {
                    BookingDecision::Create {
                        customer_name,
                        date,
                        time,
                        service_type,
                    } => {
                        self.create_booking(
                            business.id,
                            customer_id,
                            &customer_name,
                            &date,
                            &time,
                            &service_type,
                        )
                        .await?;
                        tracing::info!(
                            business_id = %business.id,
                            customer_id = customer_id,
                            date = %date,
                            time = %time,
                            "Created pending booking from chat intent"
                        );
                        (
                            true,
                            format!(
                                "\n\nSYSTEM NOTIFICATION: You have successfully created a booking for {date} at {time}. \
                                 Inform the customer that their booking request is pending confirmation by the staff!"
                            ),
                        )
                    }
                    BookingDecision::AskForDateTime => (
                        false,
                        "\n\nSYSTEM NOTIFICATION: The customer wants to book, but is missing a date or time. \
                         Politely ask them what date and time they would prefer."
                            .to_string(),
                    ),
                    BookingDecision::NoIntent => (false, String::new()),
                },
                Err(e) => {
                    tracing::warn!(
                        business_id = %business.id,
                        error = %e,
                        "Booking intent extraction failed, continuing without booking"
                    );
                    (false, String::new())
                }
            };

        // Stage 2: grounded generation, retried once on transient failure
        let context = self.knowledge_context(business.id).await?;
        let full_context = format!("{context}{booking_notice}");
        let system = system_prompt(business, &full_context, &history_str);

        let messages = vec![ChatMessage::system(system), ChatMessage::user(incoming)];
        let reply_text = Retry::spawn(FixedInterval::from_millis(500).take(1), || {
            self.llm.chat(messages.clone(), 0.2, false)
        })
        .await?;

        Ok(ReplyOutcome {
            reply_text,
            booking_created,
        })
    }

    async fn extract_intent(
        &self,
        history: &str,
        incoming: &str,
    ) -> Result<BookingExtraction, ChatError> {
        let prompt = extraction_prompt(history, incoming);
        let raw = self
            .llm
            .chat(vec![ChatMessage::user(prompt)], 0.0, true)
            .await?;
        serde_json::from_str(&raw)
            .map_err(|e| ChatError::Extraction(format!("invalid extraction JSON: {e}")))
    }

    async fn create_booking(
        &self,
        business_id: Uuid,
        customer_id: &str,
        customer_name: &str,
        date: &str,
        time: &str,
        service_type: &str,
    ) -> Result<(), ChatError> {
        sqlx::query(
            r#"
            INSERT INTO bookings
                (business_id, customer_id, customer_name, requested_date,
                 requested_time, service_type, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', 'Auto-booked via AI chat agent.')
            "#,
        )
        .bind(business_id)
        .bind(customer_id)
        .bind(customer_name)
        .bind(date)
        .bind(time)
        .bind(service_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn knowledge_context(&self, business_id: Uuid) -> Result<String, ChatError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT content FROM knowledge_base WHERE business_id = $1 ORDER BY created_at",
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(content,)| content)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extraction(
        intent: bool,
        date: Option<&str>,
        time: Option<&str>,
    ) -> BookingExtraction {
        BookingExtraction {
            is_booking_intent: intent,
            customer_name: None,
            date: date.map(str::to_string),
            time: time.map(str::to_string),
            service_type: None,
        }
    }

    #[test]
    fn no_intent_means_no_booking() {
        assert_eq!(
            decide_booking(&extraction(false, Some("Friday"), Some("5pm"))),
            BookingDecision::NoIntent
        );
    }

    #[test]
    fn intent_without_date_asks_for_it() {
        assert_eq!(
            decide_booking(&extraction(true, None, Some("5pm"))),
            BookingDecision::AskForDateTime
        );
        assert_eq!(
            decide_booking(&extraction(true, Some("Friday"), None)),
            BookingDecision::AskForDateTime
        );
    }

    #[test]
    fn blank_date_counts_as_missing() {
        assert_eq!(
            decide_booking(&extraction(true, Some("  "), Some("5pm"))),
            BookingDecision::AskForDateTime
        );
    }

    #[test]
    fn intent_with_date_and_time_creates_pending_booking() {
        let decision = decide_booking(&extraction(true, Some("2026-03-10"), Some("15:00")));
        assert_eq!(
            decision,
            BookingDecision::Create {
                customer_name: "Customer".to_string(),
                date: "2026-03-10".to_string(),
                time: "15:00".to_string(),
                service_type: "General Service".to_string(),
            }
        );
    }

    #[test]
    fn extraction_parses_model_json() {
        let raw = r#"{
            "isBookingIntent": true,
            "customerName": "Ana",
            "date": "Friday",
            "time": "5pm",
            "serviceType": null
        }"#;
        let parsed: BookingExtraction = serde_json::from_str(raw).unwrap();
        assert!(parsed.is_booking_intent);
        assert_eq!(parsed.customer_name.as_deref(), Some("Ana"));
        assert_eq!(parsed.service_type, None);
    }

    #[test]
    fn extraction_tolerates_missing_fields() {
        let parsed: BookingExtraction = serde_json::from_str(r#"{"isBookingIntent": false}"#).unwrap();
        assert!(!parsed.is_booking_intent);
        assert_eq!(parsed.date, None);
    }

    #[test]
    fn system_prompt_carries_grounding_and_language_rule() {
        let business = Business {
            id: uuid::Uuid::new_v4(),
            name: "Mario's Pizzeria".to_string(),
            industry: Some("Restaurant".to_string()),
            bot_personality: Some("Warm and enthusiastic".to_string()),
            custom_instructions: Some("Never promise same-day delivery.".to_string()),
            telegram_bot_token: None,
            twilio_phone: None,
            plan: botlocal_shared::PlanTier::Pro,
            message_count: 0,
            stripe_customer_id: None,
        };

        let prompt = system_prompt(&business, "Opening hours: 10-22", "Customer: hi");
        assert!(prompt.contains("Mario's Pizzeria"));
        assert!(prompt.contains("Restaurant industry"));
        assert!(prompt.contains("book a table"));
        assert!(prompt.contains("Warm and enthusiastic"));
        assert!(prompt.contains("Never promise same-day delivery."));
        assert!(prompt.contains("Opening hours: 10-22"));
        assert!(prompt.contains("ALWAYS reply in that exact same language"));
    }

    #[test]
    fn history_formatting_labels_speakers() {
        let history = vec![
            TurnMessage {
                role: MessageRole::Customer,
                content: "Are you open tomorrow?".to_string(),
            },
            TurnMessage {
                role: MessageRole::Assistant,
                content: "Yes, 10am to 10pm.".to_string(),
            },
        ];
        assert_eq!(
            format_history(&history),
            "Customer: Are you open tomorrow?\nAI Assistant: Yes, 10am to 10pm."
        );
    }
}
