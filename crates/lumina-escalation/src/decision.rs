// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Escalation decision engine.
//!
//! Classifies a client message plus the generated reply into "continue
//! automated" or "escalate" using cheap, explainable signals. Pure: no I/O,
//! no clock, no shared state.
//!
//! Phrase lists are deliberately narrow. Single common words ("problema",
//! "error", "problem") never trigger an escalation on their own; only
//! compound, high-specificity phrases do.

use lumina_config::model::EscalationConfig;
use lumina_core::{EscalationReason, EscalationRequest, GeneratedReply, Priority};
use strum::Display;

/// Formal complaints and explicit distress.
const COMPLAINT_PHRASES: &[&str] = &[
    "quiero poner una queja",
    "quiero presentar una queja",
    "poner una queja",
    "presentar una queja",
    "queja formal",
    "reclamo formal",
    "pesimo servicio",
    "muy mal servicio",
    "exijo un reembolso",
    "exijo una explicacion",
    "voy a denunciar",
    "los voy a demandar",
    "me quemaron",
    "me dejaron una quemadura",
    "reaccion alergica",
    "me salio una infeccion",
    "es inaceptable",
    "file a complaint",
    "formal complaint",
    "terrible service",
    "i demand a refund",
    "allergic reaction",
    "i got burned",
];

/// Explicit requests for a person.
const HUMAN_REQUEST_PHRASES: &[&str] = &[
    "hablar con un supervisor",
    "hablar con una supervisora",
    "hablar con el supervisor",
    "hablar con una persona",
    "hablar con un humano",
    "hablar con alguien",
    "hablar con un asesor",
    "hablar con una asesora",
    "hablar con el gerente",
    "hablar con la gerente",
    "hablar con un encargado",
    "hablar con la encargada",
    "una persona real",
    "atencion humana",
    "agente humano",
    "speak to a human",
    "talk to a human",
    "speak to a person",
    "talk to a person",
    "speak to a manager",
    "talk to a manager",
    "a real person",
    "human agent",
];

/// Requests that need a tailored answer from staff.
const COMPLEX_PHRASES: &[&str] = &[
    "varios tratamientos",
    "tratamiento personalizado",
    "plan de tratamiento",
    "paquete corporativo",
    "evento privado",
    "cotizacion para grupo",
    "reservar para un grupo",
    "estoy embarazada",
    "estoy en tratamiento medico",
    "contraindicaciones",
    "multiple treatments",
    "treatment plan",
    "group booking",
    "i am pregnant",
];

const PAYMENT_PHRASES: &[&str] = &[
    "me cobraron doble",
    "me cobraron dos veces",
    "cobro doble",
    "doble cargo",
    "cargo duplicado",
    "cobro no reconocido",
    "no reconozco el cargo",
    "me cobraron de mas",
    "devolucion de mi dinero",
    "reembolso de mi pago",
    "el pago no se reflejo",
    "charged twice",
    "double charged",
    "refund my payment",
    "payment did not go through",
];

const TECHNICAL_PHRASES: &[&str] = &[
    "no puedo agendar",
    "no puedo reservar",
    "la pagina no carga",
    "la pagina no funciona",
    "no me llega el codigo",
    "no me llego la confirmacion",
    "error al pagar",
    "la app no funciona",
    "cannot book",
    "can t book",
    "website is down",
    "page won t load",
    "did not receive confirmation",
];

/// Generated-reply phrases that mean the agent cannot help. "No estoy
/// seguro" style hedging is not refusal and does not belong here.
const REFUSAL_PHRASES: &[&str] = &[
    "no puedo ayudarte con eso",
    "no puedo ayudarle con eso",
    "no estoy autorizado",
    "no estoy autorizada",
    "no tengo acceso a esa informacion",
    "fuera de mi alcance",
    "i can t help with that",
    "i cannot help with that",
    "i m unable to help",
    "outside my scope",
];

/// Generated-reply phrases that refer the client to urgent care.
const URGENT_REFERRAL_PHRASES: &[&str] = &[
    "acude a urgencias",
    "acudir a urgencias",
    "servicio de urgencias",
    "llama a emergencias",
    "atencion medica inmediata",
    "seek emergency",
    "emergency room",
    "call emergency services",
    "immediate medical attention",
];

/// Which signal fired. Logged alongside each decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Signal {
    ComplaintPhrase,
    HumanRequestPhrase,
    ComplexPhrase,
    PaymentPhrase,
    TechnicalPhrase,
    GeneratorRequested,
    RepeatedLowConfidence,
    UrgentReferral,
    GeneratorRefusal,
    LowConfidence,
}

/// An escalation decision plus the signal that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub request: EscalationRequest,
    pub signal: Signal,
}

/// Thresholds used by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionConfig {
    pub confidence_threshold: f32,
    pub high_priority_below: f32,
    pub repeated_failure_limit: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self::from(&EscalationConfig::default())
    }
}

impl From<&EscalationConfig> for DecisionConfig {
    fn from(config: &EscalationConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            high_priority_below: config.high_priority_below,
            repeated_failure_limit: config.repeated_failure_limit,
        }
    }
}

/// Conversation history the engine may consult besides the current exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSignals {
    /// Confidence of earlier automated replies, newest first.
    pub prior_confidences: Vec<f32>,
}

/// Pure escalation classifier.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    config: DecisionConfig,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Evaluate one exchange with no conversation history.
    ///
    /// Returns `None` when the automated agent should keep the conversation.
    pub fn evaluate(
        &self,
        client_message: &str,
        generated_reply: &str,
        confidence: f32,
    ) -> Option<EscalationRequest> {
        let reply = GeneratedReply {
            text: generated_reply.to_string(),
            confidence,
            escalate: None,
        };
        self.evaluate_with_signals(client_message, &reply, &ConversationSignals::default())
            .map(|d| d.request)
    }

    /// Evaluate one exchange, also honoring the generator's own escalation
    /// hint and repeated low-confidence replies.
    ///
    /// Selection order when several signals fire: complaint, explicit human
    /// request, complexity, payment, technical, generator hint, repeated
    /// failure, urgent referral, refusal, low confidence.
    pub fn evaluate_with_signals(
        &self,
        client_message: &str,
        reply: &GeneratedReply,
        signals: &ConversationSignals,
    ) -> Option<Decision> {
        let confidence = sanitize(reply.confidence);
        let message = normalize(client_message);
        let reply_text = normalize(&reply.text);

        let (reason, priority, signal) = if contains_any(&message, COMPLAINT_PHRASES) {
            (EscalationReason::Complaint, Priority::High, Signal::ComplaintPhrase)
        } else if contains_any(&message, HUMAN_REQUEST_PHRASES) {
            (
                EscalationReason::ExplicitClientRequest,
                Priority::Medium,
                Signal::HumanRequestPhrase,
            )
        } else if contains_any(&message, COMPLEX_PHRASES) {
            (EscalationReason::ComplexRequest, Priority::Medium, Signal::ComplexPhrase)
        } else if contains_any(&message, PAYMENT_PHRASES) {
            (EscalationReason::PaymentIssue, Priority::High, Signal::PaymentPhrase)
        } else if contains_any(&message, TECHNICAL_PHRASES) {
            (EscalationReason::TechnicalIssue, Priority::Medium, Signal::TechnicalPhrase)
        } else if let Some(reason) = reply.escalate {
            (
                reason,
                self.default_priority(reason, confidence),
                Signal::GeneratorRequested,
            )
        } else if self.is_repeated_failure(confidence, signals) {
            (
                EscalationReason::RepeatedFailedUnderstanding,
                Priority::Medium,
                Signal::RepeatedLowConfidence,
            )
        } else if contains_any(&reply_text, URGENT_REFERRAL_PHRASES) {
            (EscalationReason::ComplexRequest, Priority::Urgent, Signal::UrgentReferral)
        } else if contains_any(&reply_text, REFUSAL_PHRASES) {
            (EscalationReason::ComplexRequest, Priority::Medium, Signal::GeneratorRefusal)
        } else if confidence < self.config.confidence_threshold {
            (
                EscalationReason::LowConfidence,
                self.confidence_priority(confidence),
                Signal::LowConfidence,
            )
        } else {
            return None;
        };

        Some(Decision {
            request: EscalationRequest {
                reason,
                priority,
                client_message: Some(client_message.to_string()),
                automated_reply: Some(reply.text.clone()).filter(|t| !t.is_empty()),
                confidence: Some(confidence),
            },
            signal,
        })
    }

    /// Priority scales inversely with confidence.
    fn confidence_priority(&self, confidence: f32) -> Priority {
        if confidence < self.config.high_priority_below {
            Priority::High
        } else {
            Priority::Medium
        }
    }

    fn default_priority(&self, reason: EscalationReason, confidence: f32) -> Priority {
        match reason {
            EscalationReason::Complaint | EscalationReason::PaymentIssue => Priority::High,
            EscalationReason::LowConfidence => self.confidence_priority(confidence),
            _ => Priority::Medium,
        }
    }

    /// The current reply and the `limit - 1` before it were all low-confidence.
    fn is_repeated_failure(&self, confidence: f32, signals: &ConversationSignals) -> bool {
        let limit = self.config.repeated_failure_limit;
        let threshold = self.config.confidence_threshold;
        if limit == 0 || confidence >= threshold {
            return false;
        }
        let needed = limit - 1;
        needed > 0
            && signals.prior_confidences.len() >= needed
            && signals.prior_confidences[..needed]
                .iter()
                .all(|c| sanitize(*c) < threshold)
    }
}

fn sanitize(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Lowercase, strip Spanish diacritics, collapse everything that is not a
/// letter or digit into single spaces, and pad with one space on each side
/// so phrase matching respects word boundaries.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for c in text.chars().flat_map(char::to_lowercase) {
        let folded = match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        };
        if folded == ' ' && out.ends_with(' ') {
            continue;
        }
        out.push(folded);
    }
    if !out.ends_with(' ') {
        out.push(' ');
    }
    out
}

fn contains_any(normalized: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| {
        normalized
            .match_indices(p)
            .any(|(i, _)| normalized[..i].ends_with(' ') && normalized[i + p.len()..].starts_with(' '))
    })
}
