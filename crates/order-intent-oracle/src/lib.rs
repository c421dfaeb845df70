use std::time::Duration;

use order_intent_core::{MenuItem, MenuItemId, VerificationOracle, ORACLE_CATALOG_CAP};

pub const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 4_000;

/// Model requested when no explicit `--oracle-model` is configured.
pub const DEFAULT_ORACLE_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("oracle transport failed: {0}")]
    Transport(String),
    #[error("oracle reply was malformed")]
    MalformedReply,
}

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl OracleConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            timeout_ms: DEFAULT_ORACLE_TIMEOUT_MS,
        }
    }
}

/// Chat-completion adapter behind [`VerificationOracle`]. Every failure mode
/// falls back to the trait's open defaults so a dead endpoint degrades to
/// local-only resolution instead of blocking orders.
pub struct ChatOracle {
    config: OracleConfig,
}

impl ChatOracle {
    #[must_use]
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }

    fn agent(&self) -> ureq::Agent {
        let timeout = Duration::from_millis(self.config.timeout_ms.max(100));
        ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build()
    }

    fn chat_reply(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0,
        });

        let mut request = self
            .agent()
            .post(&self.config.endpoint)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json");
        if let Some(api_key) = self.config.api_key.as_deref() {
            request = request.set("Authorization", &format!("Bearer {api_key}"));
        }

        let response = request
            .send_json(payload)
            .map_err(|err| OracleError::Transport(err.to_string()))?;
        let body: serde_json::Value = serde_json::from_reader(response.into_reader())
            .map_err(|_| OracleError::MalformedReply)?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or(OracleError::MalformedReply)
    }
}

const SYSTEM_PROMPT: &str =
    "You are a careful order-taking assistant for a Thai rice-and-curry restaurant. \
     Customers speak Thai. Follow the reply format exactly.";

fn verify_prompt(item: &MenuItem, utterance: &str) -> String {
    format!(
        "A customer said: \"{utterance}\". The matcher picked the menu item \"{}\". \
         Reply with exactly one word: correct if that item is what the customer \
         ordered, incorrect otherwise.",
        item.name
    )
}

fn parse_prompt(utterance: &str, listing: &str) -> String {
    format!(
        "A customer said: \"{utterance}\". Pick the single closest dish from this \
         numbered menu and reply with just its number:\n{listing}"
    )
}

/// Capped, numbered menu listing included in freeform-parse prompts.
#[must_use]
pub fn catalog_listing(catalog: &[MenuItem]) -> (Vec<&MenuItem>, String) {
    let listed: Vec<&MenuItem> = catalog.iter().take(ORACLE_CATALOG_CAP).collect();
    let text = listed
        .iter()
        .enumerate()
        .map(|(index, item)| format!("{}. {}", index + 1, item.name))
        .collect::<Vec<_>>()
        .join("\n");
    (listed, text)
}

/// A reply disconfirms only when it says "incorrect"; anything else, including
/// an unparseable reply, confirms. "incorrect" contains "correct", so the
/// negative form MUST be checked first.
#[must_use]
pub fn parse_verify_reply(reply: &str) -> bool {
    !reply.to_lowercase().contains("incorrect")
}

/// Map a freeform-parse reply onto the listing: the first decimal run is a
/// 1-based listing number; failing that, a reply that is exactly a listed
/// name; failing that, the longest listed name appearing inside the reply.
/// Longest wins because dish names nest (ข้าวกะเพราหมู sits inside
/// ข้าวกะเพราหมูกรอบ).
#[must_use]
pub fn parse_freeform_reply(reply: &str, listed: &[&MenuItem]) -> Option<MenuItemId> {
    if let Some(number) = first_decimal_run(reply) {
        if number >= 1 {
            if let Some(item) = listed.get(number - 1) {
                return Some(item.id);
            }
        }
    }
    let trimmed = reply.trim();
    if let Some(item) = listed.iter().find(|item| item.name == trimmed) {
        return Some(item.id);
    }
    listed
        .iter()
        .filter(|item| reply.contains(&item.name))
        .max_by_key(|item| item.name.chars().count())
        .map(|item| item.id)
}

fn first_decimal_run(reply: &str) -> Option<usize> {
    let digits: String = reply
        .chars()
        .skip_while(|character| !character.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

impl VerificationOracle for ChatOracle {
    fn verify(&self, item: &MenuItem, utterance: &str) -> bool {
        match self.chat_reply(SYSTEM_PROMPT, &verify_prompt(item, utterance)) {
            Ok(reply) => parse_verify_reply(&reply),
            Err(_) => true,
        }
    }

    fn parse_freeform(&self, utterance: &str, catalog: &[MenuItem]) -> Option<MenuItemId> {
        let (listed, text) = catalog_listing(catalog);
        if listed.is_empty() {
            return None;
        }
        match self.chat_reply(SYSTEM_PROMPT, &parse_prompt(utterance, &text)) {
            Ok(reply) => parse_freeform_reply(&reply, &listed),
            Err(_) => None,
        }
    }
}
