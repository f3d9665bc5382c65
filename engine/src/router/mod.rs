//! Tier Router
//!
//! Classifies a free-text request into a reasoning-engine tier using one
//! ordered rule table. Rules are evaluated in strict priority, matching is
//! case-insensitive, and the first rule that fires decides:
//!
//! 1. Any ultra phrase → `ultra`.
//! 2. Any premium phrase → `premium`, unless the request is a short question
//!    or a brainstorm request, which stay `basic`.
//! 3. Otherwise → `basic`.
//!
//! Every routed decision is appended to the [`UsageLedger`].

pub mod ledger;

use crate::config::RouterConfig;
use sdk::errors::EngineError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

pub use ledger::{TierUsage, UsageLedger, UsageReport};

/// Reasoning-engine tier, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic,
    Premium,
    Ultra,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Basic, Tier::Premium, Tier::Ultra];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::Premium => "premium",
            Tier::Ultra => "ultra",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Tier::Basic),
            "premium" => Ok(Tier::Premium),
            "ultra" => Ok(Tier::Ultra),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

/// Money in millionths of a US dollar.
///
/// Integer units keep ledger sums exact. Serialized as a USD number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cost(u64);

impl Cost {
    pub const ZERO: Cost = Cost(0);

    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Convert a USD amount, rounding to the nearest micro-dollar.
    pub fn from_usd(usd: f64) -> Self {
        if !usd.is_finite() || usd <= 0.0 {
            return Self::ZERO;
        }
        Self((usd * 1_000_000.0).round() as u64)
    }

    pub fn micros(&self) -> u64 {
        self.0
    }

    pub fn as_usd(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    pub fn times(&self, n: u64) -> Self {
        Self(self.0.saturating_mul(n))
    }

    pub fn saturating_sub(&self, other: Cost) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl std::ops::Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for Cost {
    fn add_assign(&mut self, rhs: Cost) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.4}", self.as_usd())
    }
}

impl Serialize for Cost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_usd())
    }
}

impl<'de> Deserialize<'de> for Cost {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let usd = f64::deserialize(deserializer)?;
        Ok(Cost::from_usd(usd))
    }
}

/// Per-request price of each tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCosts {
    pub basic: Cost,
    pub premium: Cost,
    pub ultra: Cost,
}

impl TierCosts {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            basic: Cost::from_usd(config.basic_unit_cost),
            premium: Cost::from_usd(config.premium_unit_cost),
            ultra: Cost::from_usd(config.ultra_unit_cost),
        }
    }

    pub fn of(&self, tier: Tier) -> Cost {
        match tier {
            Tier::Basic => self.basic,
            Tier::Premium => self.premium,
            Tier::Ultra => self.ultra,
        }
    }
}

impl Default for TierCosts {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

/// Which rule produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleClass {
    UltraPhrase,
    PremiumPhrase,
    /// A premium phrase was present but the request is a short question
    SimpleQuestion,
    /// A premium phrase was present but the request asks for ideas or a list
    Brainstorm,
    Default,
}

impl fmt::Display for RuleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleClass::UltraPhrase => "ultra_phrase",
            RuleClass::PremiumPhrase => "premium_phrase",
            RuleClass::SimpleQuestion => "simple_question",
            RuleClass::Brainstorm => "brainstorm",
            RuleClass::Default => "default",
        };
        f.write_str(s)
    }
}

/// A phrase in the rule table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phrase {
    /// Matches anywhere in the text
    Substring(String),
    /// Matches only as a whole word (for short tokens like "ad")
    Word(String),
}

impl Phrase {
    /// Parse a configured phrase. `=word` marks a whole-word phrase.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('=') {
            Some(word) => Phrase::Word(word.trim().to_lowercase()),
            None => Phrase::Substring(raw.trim().to_lowercase()),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Phrase::Substring(s) | Phrase::Word(s) => s,
        }
    }

    fn matches(&self, normalized: &Normalized) -> bool {
        match self {
            Phrase::Substring(s) => normalized.lower.contains(s.as_str()),
            Phrase::Word(w) => normalized.padded_words.contains(&format!(" {} ", w)),
        }
    }
}

const ULTRA_PHRASES: &[&str] = &[
    "estrategia completa",
    "plan maestro",
    "análisis profundo",
    "investigación exhaustiva",
    "ultra profesional",
    "estudio de mercado completo",
    "roadmap completo",
    "plan de negocio",
    "complete strategy",
    "master plan",
    "in-depth analysis",
    "full market research",
    "business plan",
];

const PREMIUM_PHRASES: &[&str] = &[
    "profesional",
    "professional",
    "anuncio",
    "=ad",
    "=ads",
    "campaña",
    "campaign",
    "landing page",
    "video script",
    "guión",
    "copy profesional",
    "sales page",
    "llamativo",
    "impactante",
    "viral",
    "conversión",
    "conversion",
    "pitch",
    "propuesta",
    "presentación importante",
];

const BRAINSTORM_PHRASES: &[&str] = &[
    "=idea",
    "=ideas",
    "sugerencia",
    "suggest",
    "propón",
    "=lista",
    "=listas",
    "=list",
    "dame",
];

const QUESTION_WORDS: &[&str] = &[
    "qué", "que", "cómo", "como", "cuándo", "cuando", "dónde", "donde", "por qué", "cuál", "cual",
    "cuánto", "cuanto", "quién", "quien", "what", "how", "when", "where", "why", "which", "who",
];

fn phrases(configured: &Option<Vec<String>>, builtin: &[&str]) -> Vec<Phrase> {
    match configured {
        Some(list) => list.iter().map(|p| Phrase::parse(p)).collect(),
        None => builtin.iter().map(|p| Phrase::parse(p)).collect(),
    }
}

/// The ordered rule table consumed by [`TierRouter::classify`].
#[derive(Debug, Clone)]
pub struct RuleTable {
    pub ultra: Vec<Phrase>,
    pub premium: Vec<Phrase>,
    pub brainstorm: Vec<Phrase>,
    pub question_words: Vec<String>,
    /// Questions with at least this many words are not "short"
    pub short_question_words: usize,
}

impl RuleTable {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            ultra: phrases(&config.ultra_phrases, ULTRA_PHRASES),
            premium: phrases(&config.premium_phrases, PREMIUM_PHRASES),
            brainstorm: phrases(&config.brainstorm_phrases, BRAINSTORM_PHRASES),
            question_words: match &config.question_words {
                Some(words) => words.iter().map(|w| w.trim().to_lowercase()).collect(),
                None => QUESTION_WORDS.iter().map(|w| w.to_string()).collect(),
            },
            short_question_words: config.short_question_words,
        }
    }

    fn first_match<'a>(list: &'a [Phrase], text: &Normalized) -> Option<&'a Phrase> {
        list.iter().find(|p| p.matches(text))
    }

    fn is_short_question(&self, text: &Normalized) -> bool {
        if text.word_count >= self.short_question_words {
            return false;
        }
        let start = text
            .lower
            .trim_start_matches(|c: char| c.is_whitespace() || c == '¿' || c == '¡' || c == '"');
        self.question_words.iter().any(|word| {
            start.strip_prefix(word.as_str()).is_some_and(|rest| {
                rest.chars()
                    .next()
                    .map_or(true, |c| !c.is_alphanumeric())
            })
        })
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

/// Lower-cased text plus a space-padded word sequence for whole-word lookups.
struct Normalized {
    lower: String,
    padded_words: String,
    word_count: usize,
}

impl Normalized {
    fn new(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        Self {
            padded_words: format!(" {} ", words.join(" ")),
            word_count: lower.split_whitespace().count(),
            lower,
        }
    }
}

/// The outcome of classifying one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierDecision {
    pub input: String,
    pub rule: RuleClass,
    /// The phrase that fired the rule, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    pub tier: Tier,
    pub estimated_cost: Cost,
}

/// Classifies requests and records each decision in the usage ledger.
pub struct TierRouter {
    rules: RuleTable,
    costs: TierCosts,
    ledger: Arc<UsageLedger>,
}

impl TierRouter {
    pub fn new(rules: RuleTable, costs: TierCosts, ledger: Arc<UsageLedger>) -> Self {
        Self {
            rules,
            costs,
            ledger,
        }
    }

    pub fn from_config(config: &RouterConfig, ledger: Arc<UsageLedger>) -> Self {
        Self::new(
            RuleTable::from_config(config),
            TierCosts::from_config(config),
            ledger,
        )
    }

    pub fn costs(&self) -> &TierCosts {
        &self.costs
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    /// Classify without recording.
    pub fn classify(&self, text: &str) -> TierDecision {
        let normalized = Normalized::new(text);
        let (tier, rule, matched) = self.apply_rules(&normalized);

        TierDecision {
            input: text.to_string(),
            rule,
            matched,
            tier,
            estimated_cost: self.costs.of(tier),
        }
    }

    fn apply_rules(&self, text: &Normalized) -> (Tier, RuleClass, Option<String>) {
        if let Some(p) = RuleTable::first_match(&self.rules.ultra, text) {
            return (Tier::Ultra, RuleClass::UltraPhrase, Some(p.text().to_string()));
        }

        if let Some(p) = RuleTable::first_match(&self.rules.premium, text) {
            if self.rules.is_short_question(text) {
                return (Tier::Basic, RuleClass::SimpleQuestion, Some(p.text().to_string()));
            }
            if let Some(b) = RuleTable::first_match(&self.rules.brainstorm, text) {
                return (Tier::Basic, RuleClass::Brainstorm, Some(b.text().to_string()));
            }
            return (Tier::Premium, RuleClass::PremiumPhrase, Some(p.text().to_string()));
        }

        (Tier::Basic, RuleClass::Default, None)
    }

    /// Classify a request and append the decision to the ledger.
    pub async fn route(&self, text: &str) -> Result<TierDecision, EngineError> {
        let decision = self.classify(text);

        info!(
            tier = %decision.tier,
            rule = %decision.rule,
            cost = %decision.estimated_cost,
            "Request routed"
        );

        self.ledger.record(&decision).await?;
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> TierRouter {
        let ledger = Arc::new(UsageLedger::in_memory(TierCosts::default().premium));
        TierRouter::new(RuleTable::default(), TierCosts::default(), ledger)
    }

    #[test]
    fn test_brainstorm_is_basic() {
        let d = router().classify("dame 5 ideas para instagram");
        assert_eq!(d.tier, Tier::Basic);
    }

    #[test]
    fn test_professional_ad_is_premium() {
        let d = router().classify("crea un anuncio profesional para facebook");
        assert_eq!(d.tier, Tier::Premium);
        assert_eq!(d.rule, RuleClass::PremiumPhrase);
        assert_eq!(d.estimated_cost, Cost::from_usd(0.003));
    }

    #[test]
    fn test_ultra_beats_everything() {
        let d = router().classify("¿Qué es una estrategia completa? dame ideas de anuncio");
        assert_eq!(d.tier, Tier::Ultra);
        assert_eq!(d.matched.as_deref(), Some("estrategia completa"));
    }

    #[test]
    fn test_idea_stem_needs_whole_word() {
        let d = router().classify("un anuncio profesional ideal para el retiro");
        assert_eq!(d.tier, Tier::Premium);
        assert_eq!(d.rule, RuleClass::PremiumPhrase);

        let d = router().classify("campaña con el especialista, idealmente en mayo");
        assert_eq!(d.tier, Tier::Premium);

        let d = router().classify("una idea de campaña");
        assert_eq!(d.tier, Tier::Basic);
    }

    #[test]
    fn test_short_question_override() {
        let d = router().classify("¿Cómo hago un anuncio profesional?");
        assert_eq!(d.tier, Tier::Basic);
        assert_eq!(d.rule, RuleClass::SimpleQuestion);
    }

    #[test]
    fn test_long_question_escalates() {
        let text = "cómo puedo escribir un anuncio profesional para promocionar nuestro retiro de \
                    fin de semana en el valle con temazcal y meditación guiada";
        let d = router().classify(text);
        assert_eq!(d.tier, Tier::Premium);
    }

    #[test]
    fn test_question_word_must_lead() {
        // "que" appears but the text does not start with a question word
        let d = router().classify("necesito un anuncio que venda");
        assert_eq!(d.tier, Tier::Premium);
    }

    #[test]
    fn test_question_word_prefix_is_not_a_question() {
        // "cualidades" begins with "cual" but is not a question word
        let d = router().classify("cualidades de un coach profesional");
        assert_eq!(d.tier, Tier::Premium);
    }

    #[test]
    fn test_ad_is_whole_word() {
        let d = router().classify("escribe un post para la comunidad");
        assert_eq!(d.tier, Tier::Basic);
        let d = router().classify("write an ad for our retreat");
        assert_eq!(d.tier, Tier::Premium);
    }

    #[test]
    fn test_case_insensitive() {
        let d = router().classify("PLAN MAESTRO para 2025");
        assert_eq!(d.tier, Tier::Ultra);
    }

    #[test]
    fn test_plain_request_is_basic() {
        let d = router().classify("hola");
        assert_eq!(d.tier, Tier::Basic);
        assert_eq!(d.rule, RuleClass::Default);
        assert!(d.matched.is_none());
    }

    #[test]
    fn test_configured_phrases_replace_builtin() {
        let config = RouterConfig {
            premium_phrases: Some(vec!["=promo".into()]),
            ..RouterConfig::default()
        };
        let ledger = Arc::new(UsageLedger::in_memory(Cost::from_usd(0.003)));
        let router = TierRouter::from_config(&config, ledger);
        assert_eq!(router.classify("una promo para hoy").tier, Tier::Premium);
        assert_eq!(router.classify("un anuncio profesional").tier, Tier::Basic);
    }

    #[test]
    fn test_cost_conversion() {
        assert_eq!(Cost::from_usd(0.0003).micros(), 300);
        assert_eq!(Cost::from_usd(0.01).micros(), 10_000);
        assert_eq!(Cost::from_usd(-1.0), Cost::ZERO);
        assert_eq!(Cost::from_micros(3300).to_string(), "$0.0033");
    }

    #[tokio::test]
    async fn test_route_records_decision() {
        let router = router();
        router.route("hola").await.unwrap();
        router.route("plan de negocio").await.unwrap();
        let report = router.ledger().report().await;
        assert_eq!(report.total_requests, 2);
        assert_eq!(report.total_cost, Cost::from_usd(0.0003 + 0.01));
    }
}
