//! Normalization of raw company records.
//!
//! The normalizer is a pure transformation: one `RawRecord` in, one
//! `NormalizedRecord` out (or a `ValidationError` when the record carries
//! no identity signal). It produces the blocking key and the cleaned
//! comparison forms used by the scorer, while keeping the observed
//! display values untouched.
//!
//! The rules are tuned for the Turkish company corpus this engine was
//! built against: legal-form suffixes (A.Ş., LTD. ŞTİ., ...), sector
//! abbreviations (TİC., SAN., ...), and diacritic folding so that
//! `İstanbul` and `Istanbul` collide on the same key.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::record::{RawRecord, RecordId};

/// Upper bound for any single scalar field accepted from upstream.
///
/// Parsers occasionally glue page fragments into a field; anything this
/// long is garbage and rejecting it early keeps the comparators cheap.
pub const MAX_FIELD_LEN: usize = 4096;

/// Legal form of a company, extracted from the name suffix or the
/// declared `company_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyKind {
    /// Anonim Şirket (A.Ş.)
    AnonimSirket,
    /// Limited Şirket (LTD. ŞTİ.)
    Limited,
    /// Şahıs şirketi (sole proprietorship)
    Sahis,
    /// Kolektif şirket
    Kolektif,
    /// Komandit şirket
    Komandit,
}

impl CompanyKind {
    /// Returns a stable snake_case identifier for this legal form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AnonimSirket => "anonim_sirket",
            Self::Limited => "limited",
            Self::Sahis => "sahis",
            Self::Kolektif => "kolektif",
            Self::Komandit => "komandit",
        }
    }
}

impl fmt::Display for CompanyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The identity key of a normalized record.
///
/// `name_key` is always present (records without a usable name are
/// rejected). `city_key` holds the canonical display spelling; blocking
/// folds it again so spelling variants collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedKey {
    /// Folded, suffix-stripped, abbreviation-expanded uppercase name.
    pub name_key: String,

    /// Canonical title-case city, when the record has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_key: Option<String>,

    /// Lowercase website host with scheme and leading `www.` removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_key: Option<String>,
}

/// A raw record plus its normalized comparison forms.
///
/// Construction goes through [`Normalizer::normalize`]; that is what
/// guarantees every `NormalizedRecord` carries a name and at least one of
/// city/domain.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    /// The observation this was derived from.
    pub record: RawRecord,

    /// Identity key (blocking + company-id derivation).
    pub key: NormalizedKey,

    /// Cleaned display name (trimmed, whitespace collapsed, suffix kept).
    pub display_name: String,

    /// Canonical display city.
    pub city_display: Option<String>,

    /// Phone in E.164 form (`+90...`), when parseable.
    pub phone_e164: Option<String>,

    /// Digits-only phone comparison form.
    pub phone_digits: Option<String>,

    /// Valid, lowercased, deduplicated emails (sorted).
    pub emails: Vec<String>,

    /// Deduplicated keywords, first occurrence order.
    pub keywords: Vec<String>,

    /// Folded, abbreviation-expanded address, when present.
    pub address: Option<String>,

    /// Token set of the normalized address (Jaccard comparison form).
    pub address_tokens: BTreeSet<String>,

    /// Extracted legal form, when detectable.
    pub company_kind: Option<CompanyKind>,
}

impl NormalizedRecord {
    /// Id of the underlying raw record.
    #[must_use]
    pub fn record_id(&self) -> RecordId {
        self.record.record_id
    }

    /// Identity string the company id is derived from:
    /// `"{NAME}|{CITY}|{DOMAIN}"` with empty segments for absent parts.
    #[must_use]
    pub fn identity_string(&self) -> String {
        format!(
            "{}|{}|{}",
            self.key.name_key,
            self.key.city_key.as_deref().unwrap_or(""),
            self.key.domain_key.as_deref().unwrap_or(""),
        )
    }
}

/// Folds one character to its ASCII uppercase equivalent.
///
/// Turkish letters map per the corpus table; everything else goes through
/// plain ASCII uppercasing. Unknown non-ASCII characters pass through
/// unchanged so they at least compare consistently with themselves.
fn fold_char_upper(c: char) -> char {
    match c {
        'ç' | 'Ç' => 'C',
        'ğ' | 'Ğ' => 'G',
        'ı' | 'İ' => 'I',
        'i' => 'I',
        'ö' | 'Ö' => 'O',
        'ş' | 'Ş' => 'S',
        'ü' | 'Ü' => 'U',
        _ => c.to_ascii_uppercase(),
    }
}

/// Folds a string to uppercase ASCII (Turkish-aware), collapsing runs of
/// whitespace to single spaces and trimming the ends.
fn fold_upper(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_space = true;
    for c in input.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(fold_char_upper(c));
            last_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Collapses whitespace runs without changing case.
fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_space = true;
    for c in input.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(c);
            last_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Title-cases a city name word by word, preserving non-ASCII letters.
fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, word) in input.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            for c in chars {
                out.extend(c.to_lowercase());
            }
        }
    }
    out
}

/// Normalizer for raw company records.
///
/// Construction compiles the suffix/abbreviation rule set once; the
/// instance is immutable and can be shared across threads.
pub struct Normalizer {
    suffix_rules: Vec<(Regex, CompanyKind)>,
    abbreviation_rules: Vec<(Regex, &'static str)>,
    address_rules: Vec<(Regex, &'static str)>,
    email_rule: Regex,
    cities: HashMap<&'static str, &'static str>,
}

/// Legal-form suffixes, matched at the end of the folded name.
const SUFFIX_PATTERNS: &[(&str, CompanyKind)] = &[
    (r"\b(?:A\.?\s?S\.?|ANONIM\s+SIRKETI?)\s*$", CompanyKind::AnonimSirket),
    (
        r"\b(?:LTD\.?\s*STI\.?|LIMITED\s+SIRKETI?|LTD\.?)\s*$",
        CompanyKind::Limited,
    ),
    (r"\bSAHIS(?:\s+SIRKETI?)?\s*$", CompanyKind::Sahis),
    (r"\bKOLEKTIF\s+SIRKETI?\s*$", CompanyKind::Kolektif),
    (r"\bKOMANDIT\s+SIRKETI?\s*$", CompanyKind::Komandit),
];

/// Sector abbreviations, expanded anywhere in the folded name. The dot is
/// required; bare words are left alone.
const ABBREVIATION_PATTERNS: &[(&str, &str)] = &[
    (r"\bTIC\.", "TICARET"),
    (r"\bSAN\.", "SANAYI"),
    (r"\bPAZ\.", "PAZARLAMA"),
    (r"\bINS\.", "INSAAT"),
    (r"\bTEKS\.", "TEKSTIL"),
    (r"\bOTOM\.", "OTOMOTIV"),
    (r"\bELEKT\.", "ELEKTRONIK"),
    (r"\bMUH\.", "MUHENDISLIK"),
    (r"\bDAN\.", "DANISMANLIK"),
    (r"\bHIZ\.", "HIZMETLERI"),
    (r"\bTUR\.", "TURIZM"),
    (r"\bMAD\.", "MADENCILIK"),
];

/// Address abbreviations, expanded in the folded lowercase address.
const ADDRESS_PATTERNS: &[(&str, &str)] = &[
    (r"\bmah\b\.?", "mahallesi"),
    (r"\bcad\b\.?", "caddesi"),
    (r"\bsok\b\.?", "sokak"),
    (r"\bapt\b\.?", "apartmani"),
    (r"\bno\s*[:.]\s*", "numara "),
];

const EMAIL_PATTERN: &str = r"^[a-z0-9][a-z0-9._%+-]*@[a-z0-9][a-z0-9.-]*\.[a-z]{2,}$";

/// Canonical display spellings for cities, keyed by folded uppercase.
const CITIES: &[(&str, &str)] = &[
    ("ISTANBUL", "İstanbul"),
    ("ANKARA", "Ankara"),
    ("IZMIR", "İzmir"),
    ("BURSA", "Bursa"),
    ("ANTALYA", "Antalya"),
    ("ADANA", "Adana"),
    ("KONYA", "Konya"),
    ("GAZIANTEP", "Gaziantep"),
    ("MERSIN", "Mersin"),
    ("KAYSERI", "Kayseri"),
    ("ESKISEHIR", "Eskişehir"),
    ("DIYARBAKIR", "Diyarbakır"),
    ("SAMSUN", "Samsun"),
    ("DENIZLI", "Denizli"),
    ("SANLIURFA", "Şanlıurfa"),
];

impl Normalizer {
    /// Compiles the rule set.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if a rule pattern fails to
    /// compile (only possible if the built-in tables are edited).
    pub fn new() -> Result<Self, ValidationError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ValidationError::InvalidConfig {
                reason: format!("bad normalizer pattern '{pattern}': {e}"),
            })
        };

        let mut suffix_rules = Vec::with_capacity(SUFFIX_PATTERNS.len());
        for (pattern, kind) in SUFFIX_PATTERNS {
            suffix_rules.push((compile(pattern)?, *kind));
        }

        let mut abbreviation_rules = Vec::with_capacity(ABBREVIATION_PATTERNS.len());
        for (pattern, expansion) in ABBREVIATION_PATTERNS {
            abbreviation_rules.push((compile(pattern)?, *expansion));
        }

        let mut address_rules = Vec::with_capacity(ADDRESS_PATTERNS.len());
        for (pattern, expansion) in ADDRESS_PATTERNS {
            address_rules.push((compile(pattern)?, *expansion));
        }

        Ok(Self {
            suffix_rules,
            abbreviation_rules,
            address_rules,
            email_rule: compile(EMAIL_PATTERN)?,
            cities: CITIES.iter().copied().collect(),
        })
    }

    /// Normalizes one record.
    ///
    /// # Errors
    ///
    /// - `ValidationError::MissingName` when no usable legal name remains
    ///   after cleaning.
    /// - `ValidationError::MissingLocationSignal` when the record has a
    ///   name but neither a city nor a website domain: such a record can
    ///   never be matched safely and is rejected before blocking.
    /// - `ValidationError::FieldTooLong` for oversized scalar fields.
    pub fn normalize(&self, record: RawRecord) -> Result<NormalizedRecord, ValidationError> {
        self.check_lengths(&record)?;

        let raw_name = record
            .fields
            .legal_name
            .as_deref()
            .map(collapse_whitespace)
            .filter(|s| !s.is_empty());
        let Some(display_name) = raw_name else {
            return Err(ValidationError::MissingName {
                record_id: record.record_id,
            });
        };

        let (name_key, suffix_kind) = self.name_key(&display_name);
        if name_key.is_empty() {
            return Err(ValidationError::MissingName {
                record_id: record.record_id,
            });
        }

        let city_display = record
            .fields
            .city
            .as_deref()
            .and_then(|c| self.city_display(c));
        let domain_key = record.fields.website.as_deref().and_then(Self::domain_key);

        if city_display.is_none() && domain_key.is_none() {
            return Err(ValidationError::MissingLocationSignal {
                record_id: record.record_id,
            });
        }

        let (phone_e164, phone_digits) = record
            .fields
            .phone
            .as_deref()
            .and_then(Self::phone_e164)
            .map_or((None, None), |e164| {
                let digits = e164.trim_start_matches('+').to_string();
                (Some(e164), Some(digits))
            });

        let emails = self.clean_emails(&record.fields.emails);
        let keywords = Self::clean_keywords(&record.fields.keywords);

        let address = record
            .fields
            .address
            .as_deref()
            .map(|a| self.address_norm(a))
            .filter(|a| !a.is_empty());
        let address_tokens = address
            .as_deref()
            .map(Self::address_tokens)
            .unwrap_or_default();

        let company_kind = suffix_kind.or_else(|| {
            record
                .fields
                .company_type
                .as_deref()
                .and_then(Self::kind_from_declared)
        });

        let key = NormalizedKey {
            name_key,
            city_key: city_display.clone(),
            domain_key,
        };

        Ok(NormalizedRecord {
            record,
            key,
            display_name,
            city_display,
            phone_e164,
            phone_digits,
            emails,
            keywords,
            address,
            address_tokens,
            company_kind,
        })
    }

    fn check_lengths(&self, record: &RawRecord) -> Result<(), ValidationError> {
        let checks = [
            ("legal_name", record.fields.legal_name.as_deref()),
            ("city", record.fields.city.as_deref()),
            ("website", record.fields.website.as_deref()),
            ("phone", record.fields.phone.as_deref()),
            ("address", record.fields.address.as_deref()),
        ];
        for (field, value) in checks {
            if value.is_some_and(|v| v.len() > MAX_FIELD_LEN) {
                return Err(ValidationError::FieldTooLong {
                    field: field.to_string(),
                    max_length: MAX_FIELD_LEN,
                });
            }
        }
        Ok(())
    }

    /// Builds the folded name key and extracts the legal form when a
    /// suffix pattern matches.
    fn name_key(&self, display_name: &str) -> (String, Option<CompanyKind>) {
        let mut folded = fold_upper(display_name);
        let mut kind = None;

        for (rule, suffix_kind) in &self.suffix_rules {
            if rule.is_match(&folded) {
                folded = rule.replace(&folded, "").into_owned();
                kind = Some(*suffix_kind);
                break;
            }
        }

        for (rule, expansion) in &self.abbreviation_rules {
            folded = rule.replace_all(&folded, *expansion).into_owned();
        }

        // Residual punctuation separates nothing once suffixes are gone.
        let cleaned: String = folded
            .chars()
            .map(|c| if matches!(c, '.' | ',' | ';') { ' ' } else { c })
            .collect();

        (collapse_whitespace(&cleaned), kind)
    }

    /// Folded matching key for a display name, suffix stripped.
    #[must_use]
    pub fn fold_name_key(&self, display_name: &str) -> String {
        self.name_key(display_name).0
    }

    /// Canonical display spelling for a city, or a title-cased fallback.
    fn city_display(&self, city: &str) -> Option<String> {
        let folded = fold_upper(city);
        if folded.is_empty() {
            return None;
        }
        match self.cities.get(folded.as_str()) {
            Some(canonical) => Some((*canonical).to_string()),
            None => Some(title_case(&collapse_whitespace(city))),
        }
    }

    /// Folded blocking form of a (display) city.
    #[must_use]
    pub fn city_key_folded(city_display: &str) -> String {
        fold_upper(city_display)
    }

    /// Lowercase host with scheme, leading `www.`, port, and path removed.
    #[must_use]
    pub fn domain_key(website: &str) -> Option<String> {
        let mut host = website.trim().to_ascii_lowercase();
        for scheme in ["https://", "http://"] {
            if let Some(rest) = host.strip_prefix(scheme) {
                host = rest.to_string();
                break;
            }
        }
        if let Some(rest) = host.strip_prefix("www.") {
            host = rest.to_string();
        }
        if let Some(cut) = host.find(['/', '?', '#', ':']) {
            host.truncate(cut);
        }
        let host = host.trim().to_string();
        if host.is_empty() {
            None
        } else {
            Some(host)
        }
    }

    /// E.164 phone normalization with `+90` as the default country code.
    ///
    /// Accepts `0xxx xxxxxxx` national form, bare 10-digit subscriber
    /// numbers, `90`-prefixed international form, and already-prefixed
    /// `+...` numbers. Anything else is dropped rather than guessed.
    #[must_use]
    pub fn phone_e164(phone: &str) -> Option<String> {
        let trimmed = phone.trim();
        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

        if trimmed.starts_with('+') && (11..=15).contains(&digits.len()) {
            return Some(format!("+{digits}"));
        }
        if digits.len() == 12 && digits.starts_with("90") {
            return Some(format!("+{digits}"));
        }
        if digits.len() == 11 && digits.starts_with('0') {
            return Some(format!("+90{}", &digits[1..]));
        }
        if digits.len() == 10 {
            return Some(format!("+90{digits}"));
        }
        None
    }

    fn clean_emails(&self, emails: &[String]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        for raw in emails {
            let mut email = raw.trim().to_ascii_lowercase();
            if let Some(rest) = email.strip_prefix("mailto:") {
                email = rest.to_string();
            }
            if self.email_rule.is_match(&email) {
                seen.insert(email);
            }
        }
        seen.into_iter().collect()
    }

    fn clean_keywords(keywords: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for raw in keywords {
            let keyword = collapse_whitespace(raw).to_ascii_lowercase();
            if keyword.is_empty() {
                continue;
            }
            if seen.insert(fold_upper(&keyword)) {
                out.push(keyword);
            }
        }
        out
    }

    /// Folded lowercase address with abbreviations expanded.
    fn address_norm(&self, address: &str) -> String {
        let mut folded = fold_upper(address).to_ascii_lowercase();
        for (rule, expansion) in &self.address_rules {
            folded = rule.replace_all(&folded, *expansion).into_owned();
        }
        collapse_whitespace(&folded)
    }

    /// Alphanumeric token set of a normalized address.
    #[must_use]
    pub fn address_tokens(address_norm: &str) -> BTreeSet<String> {
        address_norm
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    fn kind_from_declared(declared: &str) -> Option<CompanyKind> {
        let folded = fold_upper(declared);
        if folded.contains("ANONIM") || folded.contains("A.S") || folded == "AS" {
            Some(CompanyKind::AnonimSirket)
        } else if folded.contains("LIMITED") || folded.contains("LTD") {
            Some(CompanyKind::Limited)
        } else if folded.contains("SAHIS") {
            Some(CompanyKind::Sahis)
        } else if folded.contains("KOLEKTIF") {
            Some(CompanyKind::Kolektif)
        } else if folded.contains("KOMANDIT") {
            Some(CompanyKind::Komandit)
        } else {
            None
        }
    }
}
