// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Chat Pipeline
//!
//! Covers quota boundaries (CHAT-Q01 to CHAT-Q04), envelope normalization
//! (CHAT-E01 to CHAT-E05), and the HTTP clients against a local mock server
//! (CHAT-L01 to CHAT-L03, CHAT-D01 to CHAT-D05).

use uuid::Uuid;

use botlocal_shared::PlanTier;

use crate::chat::types::Business;

fn business(plan: PlanTier, message_count: i64) -> Business {
    Business {
        id: Uuid::new_v4(),
        name: "Test Business".to_string(),
        industry: None,
        bot_personality: None,
        custom_instructions: None,
        telegram_bot_token: Some("123:ABC".to_string()),
        twilio_phone: Some("+15550001111".to_string()),
        plan,
        message_count,
        stripe_customer_id: None,
    }
}

mod limiter_tests {
    use std::sync::Arc;

    use botlocal_shared::{MessageQuota, PlanCatalog, PlanTier};

    use super::business;
    use crate::chat::limiter::PlanLimiter;

    fn limiter() -> PlanLimiter {
        PlanLimiter::new(Arc::new(PlanCatalog::standard()))
    }

    // =========================================================================
    // CHAT-Q01: used = limit - 1 - the next message is allowed
    // =========================================================================
    #[test]
    fn one_below_limit_is_allowed() {
        let decision = limiter().check(&business(PlanTier::Starter, 99));
        assert!(decision.allowed);
        assert_eq!(decision.used, 99);
        assert_eq!(decision.quota, MessageQuota::Limited(100));
    }

    // =========================================================================
    // CHAT-Q02: used = limit - denied, counter snapshot unchanged
    // =========================================================================
    #[test]
    fn at_limit_is_denied() {
        let decision = limiter().check(&business(PlanTier::Starter, 100));
        assert!(!decision.allowed);
        assert_eq!(decision.used, 100);
    }

    // =========================================================================
    // CHAT-Q03: used far past limit (historic data) - still denied
    // =========================================================================
    #[test]
    fn over_limit_is_denied() {
        assert!(!limiter().check(&business(PlanTier::Starter, 5_000)).allowed);
    }

    // =========================================================================
    // CHAT-Q04: unlimited tier never denies
    // =========================================================================
    #[test]
    fn enterprise_is_never_denied() {
        let decision = limiter().check(&business(PlanTier::Enterprise, 10_000_000));
        assert!(decision.allowed);
        assert_eq!(decision.quota, MessageQuota::Unlimited);
    }
}

mod envelope_tests {
    use crate::chat::types::{ChatCredential, ChatEvent, ChatPlatform, TelegramUpdate};

    // =========================================================================
    // CHAT-E01: real-shaped Telegram update parses and normalizes
    // =========================================================================
    #[test]
    fn telegram_update_parses_and_normalizes() {
        let raw = r#"{
            "update_id": 987654,
            "message": {
                "message_id": 42,
                "from": {"id": 11223344, "is_bot": false, "first_name": "Ana"},
                "chat": {"id": 11223344, "type": "private"},
                "date": 1700000000,
                "text": "Can I book Friday at 5pm?"
            }
        }"#;
        let update: TelegramUpdate = serde_json::from_str(raw).unwrap();
        let event = ChatEvent::Telegram {
            token: "123:ABC".to_string(),
            update,
        };

        let inbound = event.normalize().unwrap();
        assert_eq!(inbound.event_id, "telegram:987654");
        assert_eq!(inbound.platform, ChatPlatform::Telegram);
        assert_eq!(
            inbound.credential,
            ChatCredential::BotToken("123:ABC".to_string())
        );
        assert_eq!(inbound.customer_id, "11223344");
        assert_eq!(inbound.text, "Can I book Friday at 5pm?");
    }

    // =========================================================================
    // CHAT-E02: update without a text message is not a turn
    // =========================================================================
    #[test]
    fn telegram_update_without_text_is_skipped() {
        let raw = r#"{"update_id": 987655, "message": {"message_id": 43, "date": 1700000000}}"#;
        let update: TelegramUpdate = serde_json::from_str(raw).unwrap();
        let event = ChatEvent::Telegram {
            token: "123:ABC".to_string(),
            update,
        };
        assert!(event.normalize().is_none());
    }

    // =========================================================================
    // CHAT-E03: update with no message at all (edited_message etc.)
    // =========================================================================
    #[test]
    fn telegram_update_without_message_is_skipped() {
        let update: TelegramUpdate = serde_json::from_str(r#"{"update_id": 1}"#).unwrap();
        let event = ChatEvent::Telegram {
            token: "t".to_string(),
            update,
        };
        assert!(event.normalize().is_none());
    }

    // =========================================================================
    // CHAT-E04: WhatsApp event normalizes with the Twilio message sid
    // =========================================================================
    #[test]
    fn whatsapp_event_normalizes() {
        let event = ChatEvent::WhatsApp {
            message_sid: "SM123".to_string(),
            business_phone: "+15550001111".to_string(),
            customer_phone: "+491701234567".to_string(),
            body: "Hallo, habt ihr morgen offen?".to_string(),
        };

        let inbound = event.normalize().unwrap();
        assert_eq!(inbound.event_id, "twilio:SM123");
        assert_eq!(inbound.platform, ChatPlatform::WhatsApp);
        assert_eq!(
            inbound.credential,
            ChatCredential::PhoneNumber("+15550001111".to_string())
        );
        assert_eq!(inbound.customer_id, "+491701234567");
    }

    // =========================================================================
    // CHAT-E05: normalization is stable across repeated calls (same id)
    // =========================================================================
    #[test]
    fn normalization_yields_stable_event_id() {
        let update: TelegramUpdate =
            serde_json::from_str(r#"{"update_id": 7, "message": {"message_id": 1, "from": {"id": 5}, "text": "hi"}}"#)
                .unwrap();
        let event = ChatEvent::Telegram {
            token: "t".to_string(),
            update,
        };
        let a = event.normalize().unwrap();
        let b = event.normalize().unwrap();
        assert_eq!(a.event_id, b.event_id);
    }
}

mod llm_tests {
    use crate::chat::llm::{ChatMessage, GroqClient, LlmError};

    fn client(base: String) -> GroqClient {
        GroqClient::new(base, "test-key".to_string(), "llama-3.3-70b-versatile".to_string())
    }

    // =========================================================================
    // CHAT-L01: successful completion returns the message content
    // =========================================================================
    #[tokio::test]
    async fn chat_returns_completion_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"Hello there"}}]}"#,
            )
            .create_async()
            .await;

        let reply = client(server.url())
            .chat(vec![ChatMessage::user("hi")], 0.2, false)
            .await
            .unwrap();

        assert_eq!(reply, "Hello there");
        mock.assert_async().await;
    }

    // =========================================================================
    // CHAT-L02: non-success status surfaces as an API error
    // =========================================================================
    #[tokio::test]
    async fn api_error_status_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let err = client(server.url())
            .chat(vec![ChatMessage::user("hi")], 0.2, false)
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Api { status: 429, .. }));
    }

    // =========================================================================
    // CHAT-L03: response without choices is malformed, not a panic
    // =========================================================================
    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = client(server.url())
            .chat(vec![ChatMessage::user("hi")], 0.2, true)
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::MalformedResponse));
    }
}

mod dispatch_tests {
    use botlocal_shared::PlanTier;

    use super::business;
    use crate::chat::dispatch::{Dispatcher, TwilioConfig};
    use crate::chat::types::ChatPlatform;

    fn dispatcher(base: String) -> Dispatcher {
        Dispatcher::new(
            base.clone(),
            TwilioConfig {
                account_sid: "ACtest".to_string(),
                auth_token: "secret".to_string(),
                api_base: base,
            },
            "https://bots.example.com".to_string(),
        )
    }

    // =========================================================================
    // CHAT-D01: successful Telegram send
    // =========================================================================
    #[tokio::test]
    async fn telegram_send_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:ABC/sendMessage")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"message_id":1}}"#)
            .create_async()
            .await;

        let business = business(PlanTier::Starter, 0);
        dispatcher(server.url())
            .send(&business, ChatPlatform::Telegram, "11223344", "hello")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    // =========================================================================
    // CHAT-D02: definitive failure retries once, then sends the fallback
    //           (2 primary attempts + 1 fallback = 3 calls)
    // =========================================================================
    #[tokio::test]
    async fn failed_send_attempts_fallback() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:ABC/sendMessage")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":false,"description":"chat not found"}"#)
            .expect(3)
            .create_async()
            .await;

        let business = business(PlanTier::Starter, 0);
        let delivered = dispatcher(server.url())
            .send_with_fallback(&business, ChatPlatform::Telegram, "11223344", "hello")
            .await;

        assert!(!delivered);
        mock.assert_async().await;
    }

    // =========================================================================
    // CHAT-D03: successful Twilio WhatsApp send
    // =========================================================================
    #[tokio::test]
    async fn whatsapp_send_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/2010-04-01/Accounts/ACtest/Messages.json")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"sid":"SM1"}"#)
            .create_async()
            .await;

        let business = business(PlanTier::Pro, 10);
        dispatcher(server.url())
            .send(&business, ChatPlatform::WhatsApp, "+491701234567", "hallo")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    // =========================================================================
    // CHAT-D04: diagnostics reflect Telegram's getWebhookInfo result
    // =========================================================================
    #[tokio::test]
    async fn webhook_status_is_read_from_telegram() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bot123:ABC/getWebhookInfo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok":true,"result":{"url":"https://bots.example.com/webhook/telegram/123:ABC","pending_update_count":2,"last_error_message":"Connection timed out"}}"#,
            )
            .create_async()
            .await;

        let status = dispatcher(server.url())
            .telegram_webhook_status("123:ABC")
            .await
            .unwrap();

        assert_eq!(
            status.url,
            "https://bots.example.com/webhook/telegram/123:ABC"
        );
        assert_eq!(status.pending_update_count, 2);
        assert_eq!(status.last_error_message.as_deref(), Some("Connection timed out"));
    }

    // =========================================================================
    // CHAT-D05: webhook registration posts the public URL for the token
    // =========================================================================
    #[tokio::test]
    async fn webhook_registration_targets_public_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:ABC/setWebhook")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"url":"https://bots.example.com/webhook/telegram/123:ABC"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":true}"#)
            .create_async()
            .await;

        dispatcher(server.url())
            .register_telegram_webhook("123:ABC")
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
