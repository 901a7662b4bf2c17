// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message router: the single entry point on the inbound path.
//!
//! For each inbound message the router appends it to the conversation and
//! consults the takeover state. An active human session gets the message
//! surfaced to its holder and automated processing is skipped entirely; a
//! paused session queues it for the holder; otherwise the automated path
//! runs (generator, decision engine, optional escalation, reply).

use std::sync::Arc;

use lumina_config::model::{EscalationConfig, GeneratorConfig};
use lumina_core::{
    ControlState, Conversation, ConversationStatus, ConversationStore, Escalation, HandledBy,
    InboundMessage, LuminaError, Message, NewMessage, OutboundMessage, ReplyContext, SenderRole,
};
use lumina_escalation::{ConversationSignals, DecisionConfig, DecisionEngine, EscalationLedger};
use lumina_takeover::{OperatorEvent, TakeoverManager};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::generator::GuardedGenerator;

const OPEN_ATTEMPTS: usize = 3;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteOutcome {
    pub conversation_id: String,
    pub handled_by: HandledBy,
    /// The automated (or handoff) reply sent back, if any.
    pub reply: Option<String>,
    /// Escalation opened by this message.
    pub escalation: Option<Escalation>,
    /// True when the reply came from the fallback path.
    pub degraded: bool,
}

impl RouteOutcome {
    fn human(conversation_id: String) -> Self {
        Self {
            conversation_id,
            handled_by: HandledBy::Human,
            reply: None,
            escalation: None,
            degraded: false,
        }
    }
}

pub struct MessageRouter {
    store: Arc<dyn ConversationStore>,
    manager: TakeoverManager,
    ledger: EscalationLedger,
    engine: DecisionEngine,
    generator: GuardedGenerator,
    handoff_message: String,
    context_messages: usize,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        manager: TakeoverManager,
        ledger: EscalationLedger,
        generator: GuardedGenerator,
        escalation: &EscalationConfig,
        generator_config: &GeneratorConfig,
    ) -> Self {
        Self {
            store,
            manager,
            ledger,
            engine: DecisionEngine::new(DecisionConfig::from(escalation)),
            generator,
            handoff_message: escalation.handoff_message.clone(),
            context_messages: generator_config.context_messages,
        }
    }

    pub fn manager(&self) -> &TakeoverManager {
        &self.manager
    }

    pub fn ledger(&self) -> &EscalationLedger {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Route one inbound message.
    ///
    /// Every call bumps the conversation's last activity. The conversation
    /// lock is released while the generator runs; control is re-checked
    /// before the automated reply is appended, and the reply is discarded if
    /// a human took over in the meantime.
    pub async fn route(&self, inbound: InboundMessage) -> Result<RouteOutcome, LuminaError> {
        debug!(
            channel = %inbound.channel,
            external_id = inbound.external_id.as_deref().unwrap_or("-"),
            received_at = %inbound.received_at,
            "routing inbound message"
        );
        let (conversation, guard) = self.lock_open_conversation(&inbound).await?;
        let conv = conversation.id.clone();
        let channel = conversation.channel;

        let client_message = self
            .store
            .append_message(
                &conv,
                NewMessage::client(inbound.content.clone(), inbound.media_ref.clone()),
            )
            .await?;

        if let Some(outcome) = self.route_to_holder(&conv, &client_message).await? {
            lumina_prometheus::record_routed(&channel.to_string(), "human");
            return Ok(outcome);
        }
        drop(guard);

        let history = self
            .store
            .list_messages(&conv, Some(self.context_messages.max(1)))
            .await?;
        let signals = ConversationSignals {
            prior_confidences: self
                .store
                .recent_confidences(&conv, self.engine.config().repeated_failure_limit)
                .await?,
        };
        let context = ReplyContext {
            conversation_id: conv.clone(),
            channel,
            history,
        };
        let generation = self.generator.generate(&inbound.content, &context).await;

        let guard = self.manager.locks().lock(&conv).await;
        if !matches!(
            self.manager.control_state(&conv).await?,
            ControlState::Automated | ControlState::EscalatedUnassigned { .. }
        ) {
            info!(
                conversation_id = %conv,
                "human took control while generating, automated reply discarded"
            );
            lumina_prometheus::record_routed(&channel.to_string(), "human");
            return Ok(RouteOutcome::human(conv));
        }

        let decision =
            self.engine
                .evaluate_with_signals(&inbound.content, &generation.reply, &signals);
        let mut reply_text = generation.reply.text.clone();
        let mut escalation = None;
        if let Some(decision) = decision {
            debug!(
                conversation_id = %conv,
                signal = %decision.signal,
                reason = %decision.request.reason,
                "decision engine requested escalation"
            );
            let outcome = self.ledger.create(&conv, decision.request).await?;
            if outcome.is_created() {
                let created = outcome.into_escalation();
                self.manager.events().publish(OperatorEvent::EscalationCreated {
                    escalation: created.clone(),
                });
                reply_text = self.handoff_message.clone();
                escalation = Some(created);
            }
        }

        self.store
            .append_message(
                &conv,
                NewMessage::automated(reply_text.clone(), generation.reply.confidence),
            )
            .await?;
        drop(guard);

        self.manager
            .outbound()
            .deliver(&OutboundMessage {
                conversation_id: conv.clone(),
                channel,
                client_ref: conversation.client_ref,
                sender: SenderRole::Automated,
                content: reply_text.clone(),
            })
            .await;

        debug!(
            conversation_id = %conv,
            escalated = escalation.is_some(),
            degraded = generation.degraded,
            "message handled by automated path"
        );
        lumina_prometheus::record_routed(&channel.to_string(), "automated");
        Ok(RouteOutcome {
            conversation_id: conv,
            handled_by: HandledBy::Automated,
            reply: Some(reply_text),
            escalation,
            degraded: generation.degraded,
        })
    }

    /// Find or create the client's conversation and take its lock.
    ///
    /// The reaper may close an idle conversation between the lookup and the
    /// lock; the status is re-read under the lock and a closed one is replaced.
    async fn lock_open_conversation(
        &self,
        inbound: &InboundMessage,
    ) -> Result<(Conversation, OwnedMutexGuard<()>), LuminaError> {
        for _ in 0..OPEN_ATTEMPTS {
            let conversation = self
                .store
                .open_conversation(&inbound.client_ref, inbound.channel)
                .await?;
            let guard = self.manager.locks().lock(&conversation.id).await;
            let current = self.store.get_conversation(&conversation.id).await?;
            if current.status != ConversationStatus::Closed {
                return Ok((current, guard));
            }
            debug!(conversation_id = %conversation.id, "conversation closed before lock, reopening");
        }
        Err(LuminaError::Conflict(format!(
            "no open conversation for {} after {OPEN_ATTEMPTS} attempts",
            inbound.client_ref
        )))
    }

    /// Surface the message to a session holder, if there is one.
    async fn route_to_holder(
        &self,
        conv: &str,
        message: &Message,
    ) -> Result<Option<RouteOutcome>, LuminaError> {
        match self.manager.control_state(conv).await? {
            ControlState::Human { holder } => {
                debug!(conversation_id = conv, %holder, "routed to active holder");
                self.manager.events().publish(OperatorEvent::MessageForHolder {
                    holder,
                    message: message.clone(),
                });
                Ok(Some(RouteOutcome::human(conv.to_string())))
            }
            ControlState::Paused { holder } => {
                debug!(conversation_id = conv, %holder, "queued for paused holder");
                self.manager.events().publish(OperatorEvent::MessageQueued {
                    holder,
                    message: message.clone(),
                });
                Ok(Some(RouteOutcome::human(conv.to_string())))
            }
            ControlState::Automated | ControlState::EscalatedUnassigned { .. } => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use lumina_config::model::TakeoverConfig;
    use lumina_core::{
        AdapterType, Channel, EscalationReason, GeneratedReply, HealthStatus, PluginAdapter,
        Priority, ReplyGenerator,
    };
    use lumina_storage::{Database, SqliteConversationStore};

    use super::*;

    /// Replies with canned (text, confidence) pairs in order, repeating the last.
    struct Scripted {
        replies: Mutex<Vec<(String, f32)>>,
    }

    impl Scripted {
        fn new(replies: &[(&str, f32)]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .iter()
                        .rev()
                        .map(|(t, c)| (t.to_string(), *c))
                        .collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl PluginAdapter for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Generator
        }
        async fn health_check(&self) -> Result<HealthStatus, LuminaError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), LuminaError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ReplyGenerator for Scripted {
        async fn generate(&self, _: &str, _: &ReplyContext) -> Result<GeneratedReply, LuminaError> {
            let mut replies = self.replies.lock().unwrap();
            let (text, confidence) = if replies.len() > 1 {
                replies.pop().unwrap()
            } else {
                replies.last().cloned().unwrap()
            };
            Ok(GeneratedReply {
                text,
                confidence,
                escalate: None,
            })
        }
    }

    /// Store whose first lookup hands back a conversation the reaper closes
    /// before the router can lock it.
    struct ClosedUnderfoot {
        inner: SqliteConversationStore,
        manager: TakeoverManager,
        closed: Mutex<Option<String>>,
        armed: AtomicBool,
    }

    #[async_trait]
    impl PluginAdapter for ClosedUnderfoot {
        fn name(&self) -> &str {
            "closed-underfoot"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Store
        }
        async fn health_check(&self) -> Result<HealthStatus, LuminaError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), LuminaError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ConversationStore for ClosedUnderfoot {
        async fn open_conversation(
            &self,
            client_ref: &str,
            channel: Channel,
        ) -> Result<Conversation, LuminaError> {
            let conversation = self.inner.open_conversation(client_ref, channel).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                let idle_before = Utc::now() + chrono::Duration::days(1);
                assert!(self.manager.close_if_idle(&conversation.id, idle_before).await?);
                *self.closed.lock().unwrap() = Some(conversation.id.clone());
            }
            Ok(conversation)
        }
        async fn get_conversation(&self, id: &str) -> Result<Conversation, LuminaError> {
            self.inner.get_conversation(id).await
        }
        async fn set_status(&self, id: &str, status: ConversationStatus) -> Result<(), LuminaError> {
            self.inner.set_status(id, status).await
        }
        async fn append_message(
            &self,
            conversation_id: &str,
            message: NewMessage,
        ) -> Result<Message, LuminaError> {
            self.inner.append_message(conversation_id, message).await
        }
        async fn list_messages(
            &self,
            conversation_id: &str,
            limit: Option<usize>,
        ) -> Result<Vec<Message>, LuminaError> {
            self.inner.list_messages(conversation_id, limit).await
        }
        async fn recent_confidences(
            &self,
            conversation_id: &str,
            count: usize,
        ) -> Result<Vec<f32>, LuminaError> {
            self.inner.recent_confidences(conversation_id, count).await
        }
        async fn touch(&self, conversation_id: &str, at: DateTime<Utc>) -> Result<(), LuminaError> {
            self.inner.touch(conversation_id, at).await
        }
    }

    async fn router(generator: Option<Arc<dyn ReplyGenerator>>) -> MessageRouter {
        let db = Database::open_in_memory().await.unwrap();
        let store = Arc::new(SqliteConversationStore::new(db.clone()));
        let manager = TakeoverManager::new(db.clone(), &TakeoverConfig::default());
        let ledger = EscalationLedger::new(db);
        let generator_config = GeneratorConfig::default();
        MessageRouter::new(
            store,
            manager,
            ledger,
            GuardedGenerator::new(generator, &generator_config),
            &EscalationConfig::default(),
            &generator_config,
        )
    }

    fn inbound(client: &str, text: &str) -> InboundMessage {
        InboundMessage {
            channel: Channel::Whatsapp,
            client_ref: client.into(),
            content: text.into(),
            media_ref: None,
            external_id: None,
            received_at: chrono::Utc::now(),
        }
    }

    async fn conversation_status(router: &MessageRouter, conv: &str) -> ConversationStatus {
        router.store.get_conversation(conv).await.unwrap().status
    }

    #[tokio::test]
    async fn confident_reply_stays_automated() {
        let router = router(Some(Scripted::new(&[("Abrimos a las 9.", 0.95)]))).await;
        let outcome = router.route(inbound("c1", "¿A qué hora abren?")).await.unwrap();
        assert_eq!(outcome.handled_by, HandledBy::Automated);
        assert_eq!(outcome.reply.as_deref(), Some("Abrimos a las 9."));
        assert!(outcome.escalation.is_none());

        let log = router.store.list_messages(&outcome.conversation_id, None).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sender, SenderRole::Client);
        assert_eq!(log[1].sender, SenderRole::Automated);
        assert_eq!(conversation_status(&router, &outcome.conversation_id).await, ConversationStatus::Active);
    }

    #[tokio::test]
    async fn supervisor_request_escalates_once() {
        let router = router(Some(Scripted::new(&[("Claro.", 0.9)]))).await;
        let first = router
            .route(inbound("c1", "quiero hablar con un supervisor"))
            .await
            .unwrap();
        let escalation = first.escalation.clone().expect("escalation created");
        assert_eq!(escalation.reason, EscalationReason::ExplicitClientRequest);
        assert_eq!(escalation.priority, Priority::Medium);
        assert_eq!(
            first.reply.as_deref(),
            Some(EscalationConfig::default().handoff_message.as_str())
        );
        assert_eq!(conversation_status(&router, &first.conversation_id).await, ConversationStatus::Escalated);

        let second = router
            .route(inbound("c1", "quiero hablar con un supervisor"))
            .await
            .unwrap();
        assert!(second.escalation.is_none());
        assert_eq!(second.conversation_id, first.conversation_id);
        let page = router.ledger.list(Default::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn low_confidence_is_high_priority() {
        let router = router(Some(Scripted::new(&[("Tal vez.", 0.2)]))).await;
        let outcome = router.route(inbound("c1", "¿tienen estacionamiento?")).await.unwrap();
        let escalation = outcome.escalation.unwrap();
        assert_eq!(escalation.reason, EscalationReason::LowConfidence);
        assert_eq!(escalation.priority, Priority::High);
    }

    #[tokio::test]
    async fn active_session_skips_automation() {
        let router = router(Some(Scripted::new(&[("auto", 0.95)]))).await;
        let first = router.route(inbound("c1", "hola")).await.unwrap();
        router.manager.start(&first.conversation_id, "ana").await.unwrap();
        let mut events = router.manager.events().subscribe();

        let outcome = router.route(inbound("c1", "¿sigues ahí?")).await.unwrap();
        assert_eq!(outcome.handled_by, HandledBy::Human);
        assert!(outcome.reply.is_none());
        match events.recv().await.unwrap() {
            OperatorEvent::MessageForHolder { holder, message } => {
                assert_eq!(holder, "ana");
                assert_eq!(message.content, "¿sigues ahí?");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let log = router.store.list_messages(&first.conversation_id, None).await.unwrap();
        assert!(log.iter().filter(|m| m.sender == SenderRole::Automated).count() == 1);
    }

    #[tokio::test]
    async fn paused_session_queues_for_holder() {
        let router = router(Some(Scripted::new(&[("auto", 0.95)]))).await;
        let first = router.route(inbound("c1", "hola")).await.unwrap();
        router.manager.start(&first.conversation_id, "ana").await.unwrap();
        router.manager.pause(&first.conversation_id, "ana").await.unwrap();
        let mut events = router.manager.events().subscribe();

        let outcome = router.route(inbound("c1", "hola de nuevo")).await.unwrap();
        assert_eq!(outcome.handled_by, HandledBy::Human);
        assert!(matches!(
            events.recv().await.unwrap(),
            OperatorEvent::MessageQueued { .. }
        ));
    }

    #[tokio::test]
    async fn generator_failure_falls_back_and_escalates() {
        let router = router(None).await;
        let outcome = router.route(inbound("c1", "hola")).await.unwrap();
        assert!(outcome.degraded);
        assert_eq!(outcome.handled_by, HandledBy::Automated);
        assert!(outcome.reply.is_some());
        let escalation = outcome.escalation.unwrap();
        assert_eq!(escalation.reason, EscalationReason::LowConfidence);
    }

    #[tokio::test]
    async fn repeated_low_confidence_becomes_repeated_failure() {
        let router = router(Some(Scripted::new(&[("¿Perdón?", 0.45)]))).await;
        let first = router.route(inbound("c1", "asdf")).await.unwrap();
        let esc = first.escalation.unwrap();
        assert_eq!(esc.reason, EscalationReason::LowConfidence);

        // Resolve each one so the next escalation can open.
        router.ledger.assign(&esc.id, "ana").await.unwrap();
        router.ledger.resolve(&esc.id, "sin respuesta").await.unwrap();

        let second = router.route(inbound("c1", "qwer")).await.unwrap();
        let esc = second.escalation.unwrap();
        assert_eq!(esc.reason, EscalationReason::LowConfidence);
        router.ledger.assign(&esc.id, "ana").await.unwrap();
        router.ledger.resolve(&esc.id, "sin respuesta").await.unwrap();

        let third = router.route(inbound("c1", "zxcv")).await.unwrap();
        let esc = third.escalation.unwrap();
        assert_eq!(esc.reason, EscalationReason::RepeatedFailedUnderstanding);
        assert_eq!(esc.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn closed_conversation_starts_a_new_one() {
        let router = router(Some(Scripted::new(&[("ok", 0.95)]))).await;
        let first = router.route(inbound("c1", "hola")).await.unwrap();
        router
            .store
            .set_status(&first.conversation_id, ConversationStatus::Closed)
            .await
            .unwrap();
        let second = router.route(inbound("c1", "hola otra vez")).await.unwrap();
        assert_ne!(first.conversation_id, second.conversation_id);
    }

    #[tokio::test]
    async fn conversation_closed_before_lock_is_replaced() {
        let db = Database::open_in_memory().await.unwrap();
        let manager = TakeoverManager::new(db.clone(), &TakeoverConfig::default());
        let store = Arc::new(ClosedUnderfoot {
            inner: SqliteConversationStore::new(db.clone()),
            manager: manager.clone(),
            closed: Mutex::new(None),
            armed: AtomicBool::new(true),
        });
        let generator_config = GeneratorConfig::default();
        let router = MessageRouter::new(
            store.clone(),
            manager,
            EscalationLedger::new(db),
            GuardedGenerator::new(
                Some(Scripted::new(&[("Lo siento mucho.", 0.9)])),
                &generator_config,
            ),
            &EscalationConfig::default(),
            &generator_config,
        );

        let outcome = router
            .route(inbound("c1", "quiero hablar con un supervisor"))
            .await
            .unwrap();
        assert!(outcome.reply.is_some());
        assert!(outcome.escalation.is_some());

        let closed = store.closed.lock().unwrap().clone().unwrap();
        assert_ne!(outcome.conversation_id, closed);
        assert!(router.store.list_messages(&closed, None).await.unwrap().is_empty());
        assert_eq!(conversation_status(&router, &closed).await, ConversationStatus::Closed);

        let log = router.store.list_messages(&outcome.conversation_id, None).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].content, "quiero hablar con un supervisor");
    }

    #[tokio::test]
    async fn repeated_failure_sees_past_a_short_context_window() {
        let db = Database::open_in_memory().await.unwrap();
        let generator_config = GeneratorConfig {
            context_messages: 1,
            ..GeneratorConfig::default()
        };
        let router = MessageRouter::new(
            Arc::new(SqliteConversationStore::new(db.clone())),
            TakeoverManager::new(db.clone(), &TakeoverConfig::default()),
            EscalationLedger::new(db),
            GuardedGenerator::new(Some(Scripted::new(&[("¿Perdón?", 0.45)])), &generator_config),
            &EscalationConfig::default(),
            &generator_config,
        );

        for text in ["asdf", "qwer"] {
            let esc = router.route(inbound("c1", text)).await.unwrap().escalation.unwrap();
            assert_eq!(esc.reason, EscalationReason::LowConfidence);
            router.ledger.assign(&esc.id, "ana").await.unwrap();
            router.ledger.resolve(&esc.id, "sin respuesta").await.unwrap();
        }

        let third = router.route(inbound("c1", "zxcv")).await.unwrap();
        assert_eq!(
            third.escalation.unwrap().reason,
            EscalationReason::RepeatedFailedUnderstanding
        );
    }
}
