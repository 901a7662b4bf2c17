// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Lumina conversation control core.
//!
//! This crate provides the error taxonomy, the domain types (conversations,
//! messages, escalations, takeover sessions), and the adapter traits for the
//! collaborators the core consumes: conversation store, reply generator, and
//! outbound transport.

pub mod error;
pub mod traits;
pub mod types;

pub use error::LuminaError;
pub use types::{
    AdapterType, Channel, ControlState, Conversation, ConversationStatus, CreateOutcome,
    Escalation, EscalationFilter, EscalationReason, EscalationRequest, EscalationStats,
    EscalationStatus, GeneratedReply, HandledBy, HealthStatus, InboundEnvelope, InboundMessage,
    Message, NewMessage, OutboundMessage, Page, Priority, ReplyContext, SenderRole, SessionState,
    TakeoverSession, TransferRecord,
};

pub use traits::{ConversationStore, OutboundTransport, PluginAdapter, ReplyGenerator};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::types::{WebInbound, WhatsAppInbound};

    #[test]
    fn error_helpers_classify_variants() {
        assert!(LuminaError::Conflict("held".into()).is_conflict());
        assert!(LuminaError::not_found("escalation", "e-1").is_not_found());
        assert!(LuminaError::Validation("empty".into()).is_validation());
        assert_eq!(LuminaError::not_found("session", "c-1").code(), "not_found");
        assert_eq!(
            LuminaError::not_found("session", "c-1").to_string(),
            "session not found: c-1"
        );
    }

    #[test]
    fn enums_round_trip_through_strings() {
        for reason in [
            EscalationReason::LowConfidence,
            EscalationReason::RepeatedFailedUnderstanding,
            EscalationReason::Complaint,
            EscalationReason::ComplexRequest,
            EscalationReason::TechnicalIssue,
            EscalationReason::PaymentIssue,
            EscalationReason::ExplicitClientRequest,
            EscalationReason::OperatorInitiated,
        ] {
            let parsed = EscalationReason::from_str(&reason.to_string()).expect("should parse");
            assert_eq!(parsed, reason);
        }
        assert_eq!(EscalationReason::ExplicitClientRequest.to_string(), "explicit_client_request");
        assert_eq!(Channel::Whatsapp.to_string(), "whatsapp");
        assert_eq!(SessionState::from_str("paused").unwrap(), SessionState::Paused);
    }

    #[test]
    fn priority_orders_by_urgency() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::High < Priority::Urgent);
        let mut all = vec![Priority::Urgent, Priority::Low, Priority::High, Priority::Medium];
        all.sort();
        assert_eq!(all, vec![Priority::Low, Priority::Medium, Priority::High, Priority::Urgent]);
    }

    #[test]
    fn only_pending_and_assigned_are_open() {
        assert!(EscalationStatus::Pending.is_open());
        assert!(EscalationStatus::Assigned.is_open());
        assert!(!EscalationStatus::Resolved.is_open());
    }

    #[test]
    fn web_envelope_normalizes() {
        let inbound = InboundEnvelope::Web(WebInbound {
            client_ref: "  visitor-7 ".into(),
            text: Some(" hola ".into()),
            media_url: None,
        })
        .into_inbound()
        .unwrap();
        assert_eq!(inbound.channel, Channel::Web);
        assert_eq!(inbound.client_ref, "visitor-7");
        assert_eq!(inbound.content, "hola");
        assert!(inbound.external_id.is_none());
    }

    #[test]
    fn whatsapp_envelope_keeps_media_and_timestamp() {
        let inbound = InboundEnvelope::WhatsApp(WhatsAppInbound {
            wa_id: "5215550001111".into(),
            message_id: "wamid.1".into(),
            text: None,
            media_id: Some("media-9".into()),
            timestamp: Some(1_700_000_000),
        })
        .into_inbound()
        .unwrap();
        assert_eq!(inbound.channel, Channel::Whatsapp);
        assert_eq!(inbound.media_ref.as_deref(), Some("media-9"));
        assert_eq!(inbound.external_id.as_deref(), Some("wamid.1"));
        assert_eq!(inbound.received_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn empty_envelopes_are_rejected() {
        let err = InboundEnvelope::Web(WebInbound {
            client_ref: "v".into(),
            text: Some("   ".into()),
            media_url: None,
        })
        .into_inbound()
        .unwrap_err();
        assert!(err.is_validation());

        let err = InboundEnvelope::Web(WebInbound {
            client_ref: " ".into(),
            text: Some("hola".into()),
            media_url: None,
        })
        .into_inbound()
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn envelope_deserializes_by_channel_tag() {
        let json = r#"{"channel":"whatsapp","wa_id":"1","message_id":"m","text":"hi","media_id":null,"timestamp":null}"#;
        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert!(matches!(env, InboundEnvelope::WhatsApp(_)));

        let json = r#"{"channel":"web","client_ref":"v-1","text":"hola"}"#;
        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert!(matches!(env, InboundEnvelope::Web(_)));
    }

    #[test]
    fn control_state_serializes_tagged() {
        let json = serde_json::to_string(&ControlState::Human {
            holder: "ana".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"human","holder":"ana"}"#);
    }

    #[test]
    fn filter_validation_and_paging() {
        let filter = EscalationFilter::default();
        assert!(filter.validate().is_ok());
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.per_page(), 20);
        assert_eq!(filter.offset(), 0);

        let filter = EscalationFilter {
            page: Some(3),
            per_page: Some(10),
            ..Default::default()
        };
        assert_eq!(filter.offset(), 20);

        let bad = EscalationFilter {
            page: Some(0),
            ..Default::default()
        };
        assert!(bad.validate().unwrap_err().is_validation());

        let now = chrono::Utc::now();
        let bad = EscalationFilter {
            from: Some(now),
            to: Some(now - chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(bad.validate().unwrap_err().is_validation());
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_store<T: ConversationStore>() {}
        fn _assert_generator<T: ReplyGenerator>() {}
        fn _assert_transport<T: OutboundTransport>() {}
    }

    proptest::proptest! {
        #[test]
        fn web_client_ref_is_always_trimmed(pad in "[ \t]{0,4}", core in "[a-z0-9-]{1,16}") {
            let inbound = InboundEnvelope::Web(WebInbound {
                client_ref: format!("{pad}{core}{pad}"),
                text: Some("hola".into()),
                media_url: None,
            })
            .into_inbound()
            .unwrap();
            proptest::prop_assert_eq!(inbound.client_ref, core);
        }
    }
}
