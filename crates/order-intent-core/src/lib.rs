use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum IntentError {
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MenuItemId(pub Ulid);

impl MenuItemId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// # Errors
    /// Returns [`IntentError::Validation`] when `value` is not a ULID.
    pub fn from_string(value: &str) -> Result<Self, IntentError> {
        Ulid::from_string(value)
            .map(Self)
            .map_err(|_| IntentError::Validation(format!("invalid ULID: {value}")))
    }
}

impl Default for MenuItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for MenuItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OrderId(pub Ulid);

impl OrderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// # Errors
    /// Returns [`IntentError::Validation`] when `value` is not a ULID.
    pub fn from_string(value: &str) -> Result<Self, IntentError> {
        Ulid::from_string(value)
            .map(Self)
            .map_err(|_| IntentError::Validation(format!("invalid ULID: {value}")))
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Standard,
    Premium,
    Special,
    Soup,
    Salad,
    Kapkhao,
}

impl Category {
    pub const ALL: [Self; 6] =
        [Self::Standard, Self::Premium, Self::Special, Self::Soup, Self::Salad, Self::Kapkhao];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Special => "special",
            Self::Soup => "soup",
            Self::Salad => "salad",
            Self::Kapkhao => "kapkhao",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(Self::Standard),
            "premium" => Some(Self::Premium),
            "special" => Some(Self::Special),
            "soup" => Some(Self::Soup),
            "salad" => Some(Self::Salad),
            "kapkhao" => Some(Self::Kapkhao),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [Self; 3] = [Self::Pending, Self::Completed, Self::Cancelled];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub name: String,
    pub keyword_set: Vec<String>,
    pub base_price: u32,
    pub category: Category,
    pub active: bool,
}

impl MenuItem {
    /// # Errors
    /// Returns [`IntentError::Validation`] when the name or keyword set
    /// would make the item unmatchable.
    pub fn validate(&self) -> Result<(), IntentError> {
        if self.name.trim().is_empty() {
            return Err(IntentError::Validation(
                "menu item name MUST be non-empty".to_string(),
            ));
        }
        if self.keyword_set.is_empty() {
            return Err(IntentError::Validation(
                "keyword_set MUST contain at least one keyword".to_string(),
            ));
        }
        if self.keyword_set.iter().any(|keyword| keyword.trim().is_empty()) {
            return Err(IntentError::Validation(
                "keywords MUST be non-empty tokens".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MenuItemDraft {
    pub name: String,
    pub keyword_set: Vec<String>,
    pub base_price: u32,
    pub category: Category,
}

impl MenuItemDraft {
    #[must_use]
    pub fn into_item(self, id: MenuItemId, active: bool) -> MenuItem {
        MenuItem {
            id,
            name: self.name,
            keyword_set: self.keyword_set,
            base_price: self.base_price,
            category: self.category,
            active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CatalogSnapshot {
    pub snapshot_id: String,
    pub active: Vec<MenuItem>,
    pub inactive: Vec<MenuItem>,
}

impl CatalogSnapshot {
    /// Partition `items` into the active and inactive views handed to each
    /// resolution call.
    ///
    /// # Errors
    /// Returns [`IntentError::Validation`] when any item fails validation or
    /// two items share a name.
    pub fn from_items(
        snapshot_id: impl Into<String>,
        items: Vec<MenuItem>,
    ) -> Result<Self, IntentError> {
        let mut seen = std::collections::BTreeSet::new();
        for item in &items {
            item.validate()?;
            if !seen.insert(item.name.clone()) {
                return Err(IntentError::Validation(format!(
                    "menu item names MUST be unique, duplicate: {}",
                    item.name
                )));
            }
        }
        let (active, inactive) = items.into_iter().partition(|item| item.active);
        Ok(Self { snapshot_id: snapshot_id.into(), active, inactive })
    }
}

/// One accepted resolution persisted as an order line. `item_name` is the
/// display name after add-on transforms, not the catalog name.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub item_id: MenuItemId,
    pub item_name: String,
    pub add_ons: Vec<AppliedAddOn>,
    pub note: Option<String>,
    pub total_price: u32,
    pub status: OrderStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AddOnDefinition {
    pub name: String,
    pub surcharge: u32,
    pub is_mutually_exclusive_with_dish_name: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AppliedAddOn {
    pub name: String,
    pub surcharge: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PricedLine {
    pub display_name: String,
    pub add_ons: Vec<AppliedAddOn>,
    pub note: Option<String>,
    pub total_price: u32,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct ResolutionCandidate {
    pub item: MenuItem,
    pub score: u32,
    pub protein_conflict: bool,
    pub keywords_matched: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Resolved {
        item: MenuItem,
        display_name: String,
        add_ons: Vec<AppliedAddOn>,
        note: Option<String>,
        total_price: u32,
    },
    SoldOut {
        item_name: String,
    },
    Ambiguous {
        suggestions: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    LiteralOverride,
    AutoAccept,
    OracleConfirmed,
    LocalOverride,
    OracleParse,
    SoldOut,
    Ambiguous,
}

impl ResolutionPath {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LiteralOverride => "literal_override",
            Self::AutoAccept => "auto_accept",
            Self::OracleConfirmed => "oracle_confirmed",
            Self::LocalOverride => "local_override",
            Self::OracleParse => "oracle_parse",
            Self::SoldOut => "sold_out",
            Self::Ambiguous => "ambiguous",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Resolution {
    pub outcome: ResolutionOutcome,
    pub confidence: Option<u32>,
    pub path: ResolutionPath,
}

/// External judge consulted when local scoring is uncertain. Implementations
/// MUST fail open: `verify` defaults to `true` and `parse_freeform` to `None`
/// on any transport, timeout, or parse failure.
pub trait VerificationOracle {
    fn verify(&self, item: &MenuItem, utterance: &str) -> bool;
    fn parse_freeform(&self, utterance: &str, catalog: &[MenuItem]) -> Option<MenuItemId>;
}

/// Stand-in used when no external judge is configured.
pub struct DisabledOracle;

impl VerificationOracle for DisabledOracle {
    fn verify(&self, _item: &MenuItem, _utterance: &str) -> bool {
        true
    }

    fn parse_freeform(&self, _utterance: &str, _catalog: &[MenuItem]) -> Option<MenuItemId> {
        None
    }
}

/// Flat bonus when the item name appears in the raw utterance or the cleaned
/// utterance appears in the item name.
pub const NAME_SUBSTRING_BONUS: u32 = 50;
/// Multiplier applied to a matched keyword's character count.
pub const KEYWORD_WEIGHT: u32 = 2;
/// Keyword multiplier used by the suggestion ranker.
pub const SUGGESTION_KEYWORD_WEIGHT: u32 = 2;
/// Bonus when the utterance's proteins intersect the item name's proteins.
pub const PROTEIN_MATCH_BONUS: u32 = 30;
pub const MAX_CONFIDENCE: u32 = 100;
/// Below this confidence the local match is unusable.
pub const LOW_CONFIDENCE_FLOOR: u32 = 30;
/// At or above this confidence a local match survives an oracle rejection.
pub const ORACLE_OVERRIDE_FLOOR: u32 = 50;
/// Confidence cap applied when the runner-up is a near tie.
pub const NEAR_TIE_CONFIDENCE_CAP: u32 = 60;
/// Runner-up share of the top score (percent) that counts as a near tie.
pub const NEAR_TIE_PERCENT: u32 = 90;
/// At or above this confidence the top candidate is accepted unescalated.
pub const AUTO_ACCEPT_FLOOR: u32 = 85;
pub const LITERAL_OVERRIDE_CONFIDENCE: u32 = 95;
/// Confidence assigned to an item picked by the freeform oracle parse.
pub const ORACLE_PARSE_CONFIDENCE: u32 = 80;
/// Cleaned utterances shorter than this many characters skip escalation.
pub const MIN_UTTERANCE_CHARS: u32 = 8;
/// Catalog listing cap for freeform oracle prompts.
pub const ORACLE_CATALOG_CAP: usize = 30;
pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;
/// Normalized edit-distance similarity below which fuzzy fallback ignores a name.
pub const FUZZY_SIMILARITY_CUTOFF: f64 = 0.3;
/// Stamped into resolution reports so replies are comparable across releases.
pub const RESOLUTION_RULESET_VERSION: &str = "resolution.v1";

/// Protein tokens in canonical order, compounds ahead of their substrings.
/// The first [`STRICT_PROTEIN_COUNT`] entries form the strict subset whose
/// members conflict with each other.
pub const PROTEIN_TOKENS: [&str; 16] = [
    "หมูกรอบ",
    "หมูสับ",
    "ปลาหมึก",
    "หมู",
    "ไก่",
    "เนื้อ",
    "กุ้ง",
    "หมึก",
    "ปู",
    "ทะเล",
    "แหนม",
    "หมูยอ",
    "ไส้กรอก",
    "แฮม",
    "กุนเชียง",
    "เต้าหู้",
];
pub const STRICT_PROTEIN_COUNT: usize = 7;

/// Polite particles and request verbs stripped before matching. นะคะ precedes
/// นะ so the bare-คะ remainder never survives; คะ itself is never stripped
/// because it sits inside คะน้า.
pub const FILLER_PHRASES: [&str; 12] = [
    "อยากกิน",
    "อยากได้",
    "จานหนึ่ง",
    "จานนึง",
    "หน่อย",
    "นะคะ",
    "ครับ",
    "ค่ะ",
    "ด้วย",
    "เอา",
    "ขอ",
    "นะ",
];

/// Variant → canonical spelling folds. No canonical form contains its
/// variant, so folding twice is a no-op.
pub const SPELLING_FOLDS: [(&str, &str); 3] =
    [("กระเพรา", "กะเพรา"), ("คะน่า", "คะน้า"), ("ซีอิว", "ซีอิ๊ว")];

/// Short phrases that resolve directly to the shop's most common full dish
/// when the utterance equals the phrase exactly.
pub const LITERAL_OVERRIDES: [(&str, &str); 5] = [
    ("กะเพรา", "ข้าวกะเพราหมู"),
    ("ข้าวผัด", "ข้าวผัดหมู"),
    ("ผัดซีอิ๊ว", "ข้าวผัดซีอิ๊วหมู"),
    ("ราดหน้า", "ข้าวราดหน้าหมู"),
    ("ต้มยำ", "ต้มยำกุ้ง"),
];

pub const NOTE_KEYWORDS: [&str; 5] =
    ["เผ็ดมาก", "เผ็ดน้อย", "ไม่เผ็ด", "ไม่ใส่ผัก", "ไม่ใส่ถั่ว"];

/// The side-dish surcharge: ordering the dish without the rice staple.
pub const SIDE_DISH_ADD_ON: &str = "กับข้าว";
const RICE_PREFIX: &str = "ข้าว";
const SIDE_DISH_MARKER: &str = " (กับข้าว)";

const ADD_ON_TABLE: [(&str, u32, bool); 5] = [
    ("ไข่ดาว", 10, true),
    ("ไข่เจียว", 10, true),
    ("พิเศษ", 10, true),
    ("กับข้าว", 10, false),
    ("เพิ่มข้าว", 5, true),
];

#[must_use]
pub fn default_add_ons() -> Vec<AddOnDefinition> {
    ADD_ON_TABLE
        .iter()
        .map(|(name, surcharge, exclusive)| AddOnDefinition {
            name: (*name).to_string(),
            surcharge: *surcharge,
            is_mutually_exclusive_with_dish_name: *exclusive,
        })
        .collect()
}

const DEFAULT_MENU_TABLE: [(&str, &str, u32, Category); 49] = [
    ("ข้าวกะเพราหมู", "กะเพรา,กระเพรา,หมู", 50, Category::Standard),
    ("ข้าวกะเพราหมูสับ", "กะเพรา,กระเพรา,หมูสับ", 50, Category::Standard),
    ("ข้าวกะเพราไก่", "กะเพรา,กระเพรา,ไก่", 50, Category::Standard),
    ("ข้าวกะเพรากุ้ง", "กะเพรา,กระเพรา,กุ้ง", 50, Category::Standard),
    ("ข้าวกะเพราหมึก", "กะเพรา,กระเพรา,หมึก,ปลาหมึก", 50, Category::Standard),
    ("ข้าวผัดหมู", "ข้าวผัด,หมู", 50, Category::Standard),
    ("ข้าวผัดไก่", "ข้าวผัด,ไก่", 50, Category::Standard),
    ("ข้าวผัดกุ้ง", "ข้าวผัด,กุ้ง", 50, Category::Standard),
    ("ข้าวไข่เจียว", "ไข่เจียว", 50, Category::Standard),
    ("ข้าวไข่ดาว", "ไข่ดาว", 50, Category::Standard),
    ("ข้าวทอดกระเทียมหมู", "กระเทียม,ทอดกระเทียม,หมู", 50, Category::Standard),
    ("ข้าวทอดกระเทียมไก่", "กระเทียม,ทอดกระเทียม,ไก่", 50, Category::Standard),
    ("ข้าวผัดคะน้าหมู", "คะน้า,ผัดคะน้า,หมู", 50, Category::Standard),
    ("ข้าวผัดผักบุ้งหมู", "ผักบุ้ง,ผัดผักบุ้ง,หมู", 50, Category::Standard),
    ("ข้าวผัดซีอิ๊วหมู", "ผัดซีอิ๊ว,หมู", 50, Category::Standard),
    ("ข้าวราดหน้าหมู", "ราดหน้า,หมู", 50, Category::Standard),
    ("ก๋วยเตี๋ยวคั่วไก่", "ก๋วยเตี๋ยวคั่วไก่,ก๋วยเตี๋ยว,คั่วไก่", 50, Category::Standard),
    ("ข้าวผัดแหนม", "ข้าวผัด,แหนม", 50, Category::Standard),
    ("ข้าวผัดหมูยอ", "ข้าวผัด,หมูยอ", 50, Category::Standard),
    ("ข้าวผัดไส้กรอก", "ข้าวผัด,ไส้กรอก", 50, Category::Standard),
    ("ข้าวผัดแฮม", "ข้าวผัด,แฮม", 50, Category::Standard),
    ("ข้าวผัดกุนเชียง", "ข้าวผัด,กุนเชียง", 50, Category::Standard),
    ("ต้มจืดเต้าหู้หมูสับ", "ต้มจืด,เต้าหู้,หมูสับ", 50, Category::Standard),
    ("ข้าวกะเพราเนื้อ", "กะเพรา,กระเพรา,เนื้อ", 60, Category::Premium),
    ("ข้าวกะเพราหมูกรอบ", "กะเพรา,กระเพรา,หมูกรอบ", 60, Category::Premium),
    ("ข้าวผัดเนื้อ", "ข้าวผัด,เนื้อ", 60, Category::Premium),
    ("ข้าวทอดกระเทียมหมูกรอบ", "กระเทียม,ทอดกระเทียม,หมูกรอบ", 60, Category::Premium),
    ("ลาบหมู", "ลาบ,หมู", 60, Category::Premium),
    ("ลาบไก่", "ลาบ,ไก่", 60, Category::Premium),
    ("ลาบเนื้อ", "ลาบ,เนื้อ", 60, Category::Premium),
    ("ปีกไก่ทอด", "ปีกไก่,ปีกไก่ทอด,ไก่ทอด", 60, Category::Premium),
    ("ไข่เยี่ยวม้ากะเพรากรอบ", "ไข่เยี่ยวม้า,กะเพรากรอบ", 60, Category::Premium),
    ("ข้าวผัดปู", "ข้าวผัด,ปู", 55, Category::Special),
    ("ข้าวกะเพราปู", "กะเพรา,กระเพรา,ปู", 70, Category::Special),
    ("ข้าวไข่เจียวปู", "ไข่เจียว,ปู", 60, Category::Special),
    ("ข้าวปูผัดผงกะหรี่", "ปู,ผัดผงกะหรี่,ผงกะหรี่", 60, Category::Special),
    ("ผัดซีอิ๊วทะเล", "ผัดซีอิ๊ว,ทะเล", 60, Category::Special),
    ("สุกี้ทะเล", "สุกี้,ทะเล", 70, Category::Special),
    ("สุกี้กุ้ง", "สุกี้,กุ้ง", 60, Category::Special),
    ("สุกี้หมึก", "สุกี้,หมึก,ปลาหมึก", 60, Category::Special),
    ("สปาเก็ตตี้ขี้เมาทะเล", "สปาเก็ตตี้,ขี้เมา,ทะเล", 80, Category::Special),
    ("ข้าวผัดต้มยำทะเล", "ข้าวผัด,ต้มยำ,ทะเล", 70, Category::Special),
    ("ต้มยำกุ้ง", "ต้มยำ,กุ้ง", 100, Category::Soup),
    ("ต้มยำทะเล", "ต้มยำ,ทะเล", 120, Category::Soup),
    ("ต้มยำรวมมิตร", "ต้มยำ,รวมมิตร", 120, Category::Soup),
    ("ยำวุ้นเส้น", "ยำ,วุ้นเส้น", 80, Category::Salad),
    ("ยำรวมทะเล", "ยำ,ทะเล,รวมทะเล", 80, Category::Salad),
    ("ผัดผักบุ้งหมูกรอบ", "ผักบุ้ง,ผัดผักบุ้ง,หมูกรอบ", 80, Category::Kapkhao),
    ("ผัดคะน้าหมูกรอบ", "คะน้า,ผัดคะน้า,หมูกรอบ", 80, Category::Kapkhao),
];

/// The shop's fixed default menu, used to seed an empty catalog store.
#[must_use]
pub fn default_menu() -> Vec<MenuItemDraft> {
    DEFAULT_MENU_TABLE
        .iter()
        .map(|(name, keywords, base_price, category)| MenuItemDraft {
            name: (*name).to_string(),
            keyword_set: keywords.split(',').map(str::to_string).collect(),
            base_price: *base_price,
            category: *category,
        })
        .collect()
}

/// Character count. Thai script is multi-byte in UTF-8; byte lengths would
/// inflate every keyword weight and length threshold.
#[must_use]
pub fn char_count(text: &str) -> u32 {
    u32::try_from(text.chars().count()).unwrap_or(u32::MAX)
}

/// Strip filler phrases, fold spelling variants, and trim. Pure and
/// deterministic; the raw utterance is kept by callers for name-literal and
/// add-on checks.
#[must_use]
pub fn normalize_utterance(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    for filler in FILLER_PHRASES {
        text = text.replace(filler, "");
    }
    for (variant, canonical) in SPELLING_FOLDS {
        text = text.replace(variant, canonical);
    }
    text.trim().to_string()
}

/// Distinct protein tokens found in `text`, longest token first so compounds
/// like หมูกรอบ absorb their substrings before หมู is tried.
#[must_use]
pub fn extract_proteins(text: &str) -> Vec<&'static str> {
    let mut tokens = PROTEIN_TOKENS;
    tokens.sort_by(|a, b| char_count(b).cmp(&char_count(a)));
    let mut working = text.to_string();
    let mut found = Vec::new();
    for token in tokens {
        if working.contains(token) {
            found.push(token);
            working = working.replace(token, "");
        }
    }
    found
}

#[must_use]
pub fn is_strict_protein(token: &str) -> bool {
    PROTEIN_TOKENS[..STRICT_PROTEIN_COUNT].contains(&token)
}

/// The protein-conflict gate: an utterance that names proteins disqualifies
/// items whose own proteins do not intersect them, and two differing
/// strict-subset protein sets disqualify each other outright.
#[must_use]
pub fn protein_conflict(user_proteins: &[&str], item_proteins: &[&str]) -> bool {
    if user_proteins.is_empty() {
        return false;
    }
    let intersects = user_proteins.iter().any(|token| item_proteins.contains(token));
    if !intersects {
        return true;
    }
    let both_strict = user_proteins.iter().all(|token| is_strict_protein(token))
        && item_proteins.iter().all(|token| is_strict_protein(token));
    both_strict && !same_protein_set(user_proteins, item_proteins)
}

fn same_protein_set(lhs: &[&str], rhs: &[&str]) -> bool {
    lhs.len() == rhs.len() && lhs.iter().all(|token| rhs.contains(token))
}

/// Sum of `char_count(keyword) * weight` over keywords found in `text`.
#[must_use]
pub fn keyword_score(text: &str, keywords: &[String], weight: u32) -> u32 {
    keywords
        .iter()
        .filter(|keyword| text.contains(keyword.as_str()))
        .map(|keyword| char_count(keyword) * weight)
        .sum()
}

fn rank_order(lhs: (u32, &str), rhs: (u32, &str)) -> Ordering {
    rhs.0
        .cmp(&lhs.0)
        .then_with(|| char_count(lhs.1).cmp(&char_count(rhs.1)))
        .then_with(|| lhs.1.cmp(rhs.1))
}

/// Score every active item against one utterance and rank the survivors:
/// score descending, then shorter name, then name order.
#[must_use]
pub fn score_candidates(items: &[MenuItem], raw: &str, cleaned: &str) -> Vec<ResolutionCandidate> {
    let user_proteins = extract_proteins(cleaned);
    let mut candidates = Vec::new();
    for item in items {
        let mut score = 0;
        if raw.contains(&item.name) || (!cleaned.is_empty() && item.name.contains(cleaned)) {
            score += NAME_SUBSTRING_BONUS;
        }
        let mut keywords_matched = 0;
        for keyword in &item.keyword_set {
            if cleaned.contains(keyword.as_str()) {
                score += char_count(keyword) * KEYWORD_WEIGHT;
                keywords_matched += 1;
            }
        }
        let item_proteins = extract_proteins(&item.name);
        let conflict = protein_conflict(&user_proteins, &item_proteins);
        if conflict {
            score = 0;
        } else if user_proteins.iter().any(|token| item_proteins.contains(token)) {
            score += PROTEIN_MATCH_BONUS;
        }
        candidates.push(ResolutionCandidate {
            item: item.clone(),
            score,
            protein_conflict: conflict,
            keywords_matched,
        });
    }
    candidates.retain(|candidate| candidate.score > 0);
    candidates.sort_by(|a, b| rank_order((a.score, &a.item.name), (b.score, &b.item.name)));
    candidates
}

/// Exact-equality short-form table lookup, checked against both the cleaned
/// and the raw trimmed utterance before general scoring.
#[must_use]
pub fn lookup_literal_override<'a>(
    snapshot: &'a CatalogSnapshot,
    raw: &str,
    cleaned: &str,
) -> Option<&'a MenuItem> {
    let raw_trimmed = raw.trim();
    for (short_form, target) in LITERAL_OVERRIDES {
        if cleaned == short_form || raw_trimmed == short_form {
            return snapshot.active.iter().find(|item| item.name == target);
        }
    }
    None
}

/// Sold-out precedence: the best-scoring inactive item pre-empts resolution
/// when its keyword score strictly exceeds every active item's. Ties favor
/// the active catalog.
#[must_use]
pub fn sold_out_precedence<'a>(
    snapshot: &'a CatalogSnapshot,
    cleaned: &str,
) -> Option<&'a MenuItem> {
    let best_inactive = snapshot
        .inactive
        .iter()
        .map(|item| (keyword_score(cleaned, &item.keyword_set, KEYWORD_WEIGHT), item))
        .filter(|(score, _)| *score > 0)
        .min_by(|a, b| rank_order((a.0, &a.1.name), (b.0, &b.1.name)))?;
    let best_active = snapshot
        .active
        .iter()
        .map(|item| keyword_score(cleaned, &item.keyword_set, KEYWORD_WEIGHT))
        .max()
        .unwrap_or(0);
    (best_inactive.0 > best_active).then_some(best_inactive.1)
}

/// Map the top score to 0–100, capping near ties at
/// [`NEAR_TIE_CONFIDENCE_CAP`].
#[must_use]
pub fn classify_confidence(top_score: u32, second_score: Option<u32>) -> u32 {
    let mut confidence = top_score.min(MAX_CONFIDENCE);
    if let Some(second) = second_score {
        if u64::from(second) * 100 >= u64::from(top_score) * u64::from(NEAR_TIE_PERCENT) {
            confidence = confidence.min(NEAR_TIE_CONFIDENCE_CAP);
        }
    }
    confidence
}

fn too_ambiguous(cleaned: &str) -> bool {
    PROTEIN_TOKENS.contains(&cleaned) || char_count(cleaned) < MIN_UTTERANCE_CHARS
}

/// Apply add-on definitions to an accepted item: the side-dish surcharge
/// rewrites the display name (leading ข้าว stripped, marker appended), every
/// other add-on is skipped when its trigger already sits inside the dish
/// name. At most one note keyword is attached.
#[must_use]
pub fn price_order(item: &MenuItem, raw: &str, definitions: &[AddOnDefinition]) -> PricedLine {
    let mut display_name = item.name.clone();
    let mut add_ons = Vec::new();
    for definition in definitions {
        if !raw.contains(&definition.name) {
            continue;
        }
        if definition.name == SIDE_DISH_ADD_ON {
            display_name = match item.name.strip_prefix(RICE_PREFIX) {
                Some(stripped) => format!("{stripped}{SIDE_DISH_MARKER}"),
                None => format!("{}{SIDE_DISH_MARKER}", item.name),
            };
            add_ons.push(AppliedAddOn {
                name: definition.name.clone(),
                surcharge: definition.surcharge,
            });
            continue;
        }
        if definition.is_mutually_exclusive_with_dish_name && item.name.contains(&definition.name)
        {
            continue;
        }
        add_ons.push(AppliedAddOn {
            name: definition.name.clone(),
            surcharge: definition.surcharge,
        });
    }
    let note = NOTE_KEYWORDS
        .iter()
        .find(|keyword| raw.contains(*keyword) && !item.name.contains(*keyword))
        .map(|keyword| (*keyword).to_string());
    let total_price = item.base_price + add_ons.iter().map(|add_on| add_on.surcharge).sum::<u32>();
    PricedLine { display_name, add_ons, note, total_price }
}

/// Rank alternative names for an utterance: weighted keyword matches first,
/// then normalized edit-distance fills up to `limit`.
#[must_use]
pub fn rank_suggestions(items: &[MenuItem], cleaned: &str, limit: usize) -> Vec<String> {
    if cleaned.is_empty() || limit == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(u32, &MenuItem)> = items
        .iter()
        .map(|item| (keyword_score(cleaned, &item.keyword_set, SUGGESTION_KEYWORD_WEIGHT), item))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|a, b| rank_order((a.0, &a.1.name), (b.0, &b.1.name)));
    let mut suggestions: Vec<String> =
        scored.into_iter().map(|(_, item)| item.name.clone()).collect();
    if suggestions.len() < limit {
        let mut fuzzy: Vec<(f64, &str)> = items
            .iter()
            .filter(|item| !suggestions.contains(&item.name))
            .map(|item| (strsim::normalized_levenshtein(cleaned, &item.name), item.name.as_str()))
            .filter(|(similarity, _)| *similarity >= FUZZY_SIMILARITY_CUTOFF)
            .collect();
        fuzzy.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| char_count(a.1).cmp(&char_count(b.1)))
                .then_with(|| a.1.cmp(b.1))
        });
        for (_, name) in fuzzy {
            if suggestions.len() >= limit {
                break;
            }
            suggestions.push(name.to_string());
        }
    }
    suggestions.truncate(limit);
    suggestions
}

/// Standalone suggestion entry point for autocomplete-style callers.
#[must_use]
pub fn suggest(snapshot: &CatalogSnapshot, utterance: &str, limit: usize) -> Vec<String> {
    let cleaned = normalize_utterance(utterance);
    rank_suggestions(&snapshot.active, &cleaned, limit)
}

fn accepted(item: &MenuItem, raw: &str, confidence: u32, path: ResolutionPath) -> Resolution {
    let line = price_order(item, raw, &default_add_ons());
    Resolution {
        outcome: ResolutionOutcome::Resolved {
            item: item.clone(),
            display_name: line.display_name,
            add_ons: line.add_ons,
            note: line.note,
            total_price: line.total_price,
        },
        confidence: Some(confidence),
        path,
    }
}

fn ambiguous(suggestions: Vec<String>, confidence: u32) -> Resolution {
    Resolution {
        outcome: ResolutionOutcome::Ambiguous { suggestions },
        confidence: Some(confidence),
        path: ResolutionPath::Ambiguous,
    }
}

fn candidate_names(candidates: &[ResolutionCandidate], limit: usize) -> Vec<String> {
    candidates.iter().take(limit).map(|candidate| candidate.item.name.clone()).collect()
}

/// Resolve one utterance against one catalog snapshot.
///
/// Control flow: normalize, sold-out precedence, literal override, scoring,
/// confidence classification, optional oracle escalation. Every path yields
/// exactly one outcome variant; oracle failures never surface.
#[must_use]
pub fn resolve_intent(
    snapshot: &CatalogSnapshot,
    utterance: &str,
    oracle: &dyn VerificationOracle,
) -> Resolution {
    let cleaned = normalize_utterance(utterance);

    if let Some(item) = sold_out_precedence(snapshot, &cleaned) {
        return Resolution {
            outcome: ResolutionOutcome::SoldOut { item_name: item.name.clone() },
            confidence: None,
            path: ResolutionPath::SoldOut,
        };
    }

    if let Some(item) = lookup_literal_override(snapshot, utterance, &cleaned) {
        return accepted(item, utterance, LITERAL_OVERRIDE_CONFIDENCE, ResolutionPath::LiteralOverride);
    }

    let candidates = score_candidates(&snapshot.active, utterance, &cleaned);
    let confidence = match candidates.first() {
        Some(top) => classify_confidence(top.score, candidates.get(1).map(|c| c.score)),
        None => 0,
    };

    if confidence < LOW_CONFIDENCE_FLOOR {
        if !too_ambiguous(&cleaned) {
            if let Some(id) = oracle.parse_freeform(utterance, &snapshot.active) {
                if let Some(item) = snapshot.active.iter().find(|item| item.id == id) {
                    return accepted(item, utterance, ORACLE_PARSE_CONFIDENCE, ResolutionPath::OracleParse);
                }
            }
        }
        let suggestions = if candidates.is_empty() {
            rank_suggestions(&snapshot.active, &cleaned, DEFAULT_SUGGESTION_LIMIT)
        } else {
            candidate_names(&candidates, DEFAULT_SUGGESTION_LIMIT)
        };
        return ambiguous(suggestions, confidence);
    }

    if let Some(top) = candidates.first() {
        if confidence < AUTO_ACCEPT_FLOOR {
            if too_ambiguous(&cleaned) {
                return ambiguous(candidate_names(&candidates, DEFAULT_SUGGESTION_LIMIT), confidence);
            }
            if oracle.verify(&top.item, utterance) {
                return accepted(&top.item, utterance, confidence, ResolutionPath::OracleConfirmed);
            }
            if confidence >= ORACLE_OVERRIDE_FLOOR {
                return accepted(&top.item, utterance, confidence, ResolutionPath::LocalOverride);
            }
            return ambiguous(candidate_names(&candidates, DEFAULT_SUGGESTION_LIMIT), confidence);
        }
        return accepted(&top.item, utterance, confidence, ResolutionPath::AutoAccept);
    }

    ambiguous(Vec::new(), confidence)
}
