use super::names::APPOINTMENT_SETTER;
use super::source_text;
use crate::capability::{Capability, Handler};
use crate::config::BusinessConfig;
use crate::executor::TIER_KEY;
use crate::llm::{Completion, ReasoningEngine};
use crate::router::Tier;
use async_trait::async_trait;
use sdk::{
    CapabilityArgs, CapabilityOutput, EngineError, ExternalCapability, FieldKind, InputSchema,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// What a prospect is asking about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inquiry {
    Price,
    Location,
    About,
    Ceremonies,
    Duration,
    Included,
    Safety,
    Preparation,
    Experience,
    General,
}

impl Inquiry {
    /// Checked in this order; price comes first so "cuánto cuesta" is not
    /// read as a question about duration.
    const ORDER: [Inquiry; 9] = [
        Inquiry::Price,
        Inquiry::Location,
        Inquiry::About,
        Inquiry::Ceremonies,
        Inquiry::Duration,
        Inquiry::Included,
        Inquiry::Safety,
        Inquiry::Preparation,
        Inquiry::Experience,
    ];

    pub fn classify(message: &str) -> Inquiry {
        let lower = message.to_lowercase();
        Self::ORDER
            .into_iter()
            .find(|inquiry| inquiry.keywords().iter().any(|k| lower.contains(k)))
            .unwrap_or(Inquiry::General)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Inquiry::Price => "price",
            Inquiry::Location => "location",
            Inquiry::About => "about",
            Inquiry::Ceremonies => "ceremonies",
            Inquiry::Duration => "duration",
            Inquiry::Included => "included",
            Inquiry::Safety => "safety",
            Inquiry::Preparation => "preparation",
            Inquiry::Experience => "experience",
            Inquiry::General => "general",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Inquiry::Price => &["precio", "costo", "cuánto cuesta", "cuanto cuesta", "tarifa", "price", "cost"],
            Inquiry::Location => &["ubicación", "ubicacion", "dónde", "donde", "lugar", "where", "location"],
            Inquiry::About => &["consiste", "qué es", "que es", "sobre el retiro", "what is"],
            Inquiry::Ceremonies => &["medicina", "plantas", "ceremonia", "sustancia", "medicine"],
            Inquiry::Duration => &["duración", "duracion", "días", "dias", "cuánto tiempo", "how long"],
            Inquiry::Included => &["incluye", "comida", "alojamiento", "include"],
            Inquiry::Safety => &["seguro", "seguridad", "riesgo", "peligro", "safe"],
            Inquiry::Preparation => &["preparar", "preparación", "preparacion", "dieta", "prepare"],
            Inquiry::Experience => &["experiencia", "qué esperar", "primera vez", "expect"],
            Inquiry::General => &[],
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            Inquiry::Price => "The prospect asks about price. Never quote a price; invite them to the free discovery call to talk about details.",
            Inquiry::Location => "The prospect asks where the retreat is. Describe the place warmly.",
            Inquiry::About => "The prospect wants to know what the retreat is. Explain the transformation it offers.",
            Inquiry::Ceremonies => "The prospect asks about the ceremonies. Explain them respectfully, from the healing perspective.",
            Inquiry::Duration => "The prospect asks how long the retreat lasts.",
            Inquiry::Included => "The prospect asks what is included: lodging, meals, ceremonies, facilitators, integration.",
            Inquiry::Safety => "The prospect has safety concerns. Reassure them and mention the experienced facilitators and screening.",
            Inquiry::Preparation => "The prospect asks how to prepare. Explain why preparation matters and that details are shared on the call.",
            Inquiry::Experience => "The prospect asks what to expect. Be honest and welcoming, especially for a first time.",
            Inquiry::General => "Answer briefly and guide the prospect toward the discovery call.",
        }
    }
}

/// Answers prospects' questions and steers them to a discovery call.
pub struct AppointmentSetter {
    engine: Arc<dyn ReasoningEngine>,
    business: BusinessConfig,
}

impl AppointmentSetter {
    pub fn new(engine: Arc<dyn ReasoningEngine>, business: BusinessConfig) -> Self {
        Self { engine, business }
    }

    pub fn capability(handler: Handler) -> Capability {
        Capability::new(
            APPOINTMENT_SETTER,
            "Answer a prospect's question and invite them to book a discovery call",
            InputSchema::empty()
                .required("input", FieldKind::String)
                .optional("text", FieldKind::String),
            handler,
        )
    }

    fn system_prompt(&self, inquiry: Inquiry) -> String {
        format!(
            "You are the appointment setter for {name}: warm, understanding and wise. \
             You answer people who are considering the retreat.\n\n{facts}\n\n\
             Rules:\n\
             1. Never mention specific prices.\n\
             2. Keep answers under 120 words.\n\
             3. End every answer with an invitation to book a free discovery call at {link}.\n\n\
             Context: {guidance}",
            name = self.business.name,
            facts = self.business.prompt_preamble(),
            link = self.business.booking_link,
            guidance = inquiry.guidance(),
        )
    }

    fn call_to_action(&self) -> String {
        format!("Book your free discovery call: {}", self.business.booking_link)
    }

    /// Reply used when the reasoning engine is unavailable.
    pub fn fallback(&self) -> String {
        format!(
            "Thank you for reaching out to {}. {}",
            self.business.name,
            self.call_to_action()
        )
    }
}

#[async_trait]
impl ExternalCapability for AppointmentSetter {
    async fn call(&self, args: &CapabilityArgs) -> Result<CapabilityOutput, EngineError> {
        let question = source_text(args).trim();
        if question.is_empty() {
            return Err(EngineError::schema(APPOINTMENT_SETTER, "no question to answer"));
        }

        let inquiry = Inquiry::classify(question);
        let tier = args
            .param_str_opt(TIER_KEY)
            .and_then(|t| t.parse::<Tier>().ok())
            .unwrap_or(Tier::Basic);

        let request = Completion::new(tier, self.system_prompt(inquiry), question);
        let (mut text, fallback) = match self.engine.complete(&request).await {
            Ok(text) => (text, false),
            Err(e) => {
                warn!(error = %e, "Appointment setter falling back to the booking invitation");
                (self.fallback(), true)
            }
        };

        if !text.contains(&self.business.booking_link) {
            text.push_str("\n\n");
            text.push_str(&self.call_to_action());
        }

        Ok(CapabilityOutput::with_data(
            text,
            json!({
                "inquiry": inquiry.as_str(),
                "fallback": fallback,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMError, Result as LLMResult};
    use std::sync::Mutex;

    struct Scripted {
        reply: Option<&'static str>,
        seen: Mutex<Vec<Completion>>,
    }

    #[async_trait]
    impl ReasoningEngine for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model_for(&self, tier: Tier) -> &str {
            tier.as_str()
        }

        async fn complete(&self, request: &Completion) -> LLMResult<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply
                .map(str::to_string)
                .ok_or_else(|| LLMError::NetworkError("down".into()))
        }
    }

    fn setter(reply: Option<&'static str>) -> (AppointmentSetter, Arc<Scripted>) {
        let engine = Arc::new(Scripted {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        (
            AppointmentSetter::new(engine.clone(), BusinessConfig::default()),
            engine,
        )
    }

    #[test]
    fn test_classify_inquiries() {
        assert_eq!(Inquiry::classify("¿Cuánto cuesta el retiro?"), Inquiry::Price);
        assert_eq!(Inquiry::classify("¿Dónde queda?"), Inquiry::Location);
        assert_eq!(Inquiry::classify("¿Cuántos días dura?"), Inquiry::Duration);
        assert_eq!(Inquiry::classify("¿Es seguro?"), Inquiry::Safety);
        assert_eq!(Inquiry::classify("Hola"), Inquiry::General);
    }

    #[tokio::test]
    async fn test_answer_gets_booking_link() {
        let (cap, engine) = setter(Some("Estamos en Valle de Bravo."));
        let args = CapabilityArgs::new().with_param("input", json!("¿Dónde es el retiro?"));

        let out = cap.call(&args).await.unwrap();
        assert!(out.text.starts_with("Estamos en Valle de Bravo."));
        assert!(out
            .text
            .ends_with("Book your free discovery call: https://sacred-rebirth.com/appointment.html"));
        assert_eq!(out.data["inquiry"], json!("location"));

        let seen = engine.seen.lock().unwrap();
        assert!(seen[0].messages[0].content.contains("Never mention specific prices"));
        assert!(seen[0].messages[0].content.contains("Describe the place warmly"));
    }

    #[tokio::test]
    async fn test_link_not_repeated() {
        let (cap, _) = setter(Some("Agenda aquí: https://sacred-rebirth.com/appointment.html"));
        let args = CapabilityArgs::new().with_param("input", json!("quiero ir"));
        let out = cap.call(&args).await.unwrap();
        assert_eq!(out.text.matches("appointment.html").count(), 1);
    }

    #[tokio::test]
    async fn test_engine_failure_falls_back() {
        let (cap, _) = setter(None);
        let args = CapabilityArgs::new().with_param("input", json!("¿Cuánto cuesta?"));
        let out = cap.call(&args).await.unwrap();
        assert_eq!(out.data["fallback"], json!(true));
        assert!(out.text.contains("discovery call"));
    }
}
