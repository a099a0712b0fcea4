//! Field Normalizer
//!
//! Canonicalizes raw record fields into comparison-ready values:
//! - text: diacritics folded, lower-cased, punctuation replaced by spaces,
//!   whitespace collapsed, configured noise tokens removed
//! - postal code: alphanumerics only, compared as an opaque token
//! - coordinates: finite, in range and not the (0, 0) placeholder
//!
//! Normalization is a pure function of the record and the rules.

use crate::error::{MatchError, MatchResult};
use crate::types::{LocalHotelRecord, RecordSide, RemoteListingRecord};
use hmap_common::config::{FieldRulesSection, RulesSection};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold text for comparison
///
/// Drops combining marks after NFD decomposition, lower-cases, removes
/// apostrophes and turns any other non-alphanumeric run into a single space.
pub fn fold_text(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    let mut pending_space = false;

    // Recompose so that scripts like Hangul keep their precomposed syllables
    for c in raw.nfd().filter(|c| !is_combining_mark(*c)).nfc() {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_alphanumeric() {
            if pending_space && !folded.is_empty() {
                folded.push(' ');
            }
            pending_space = false;
            folded.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    folded
}

fn tokens(folded: &str) -> Vec<String> {
    folded.split(' ').filter(|t| !t.is_empty()).map(String::from).collect()
}

/// Drop every occurrence of any pattern (a token sequence) from `input`
///
/// Patterns must be sorted longest first so that "by best western" wins over
/// "best western".
fn remove_sequences(input: &[String], patterns: &[Vec<String>]) -> Vec<String> {
    let mut output = Vec::with_capacity(input.len());
    let mut i = 0;

    'outer: while i < input.len() {
        for pattern in patterns {
            let end = i + pattern.len();
            if end <= input.len() && input[i..end] == pattern[..] {
                i = end;
                continue 'outer;
            }
        }
        output.push(input[i].clone());
        i += 1;
    }

    output
}

/// Noise-token rules for one field, stored pre-folded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRules {
    words: Vec<String>,
    phrases: Vec<Vec<String>>,
    places: Vec<Vec<String>>,
}

impl FieldRules {
    pub fn new<S: AsRef<str>>(words: &[S], phrases: &[S], places: &[S]) -> Self {
        Self {
            words: words
                .iter()
                .flat_map(|w| tokens(&fold_text(w.as_ref())))
                .collect(),
            phrases: fold_patterns(phrases),
            places: fold_patterns(places),
        }
    }

    fn from_section(section: &FieldRulesSection) -> Self {
        Self::new(
            &section.remove_words,
            &section.remove_phrases,
            &section.remove_places,
        )
    }

    /// Remove phrases, then places, then single words
    fn strip(&self, input: &[String]) -> Vec<String> {
        let without_phrases = remove_sequences(input, &self.phrases);
        let without_places = remove_sequences(&without_phrases, &self.places);
        without_places
            .into_iter()
            .filter(|t| !self.words.contains(t))
            .collect()
    }

    /// True when an address component is exactly one of the configured places
    fn is_place(&self, component: &[String]) -> bool {
        self.places.iter().any(|p| p[..] == component[..])
    }
}

fn fold_patterns<S: AsRef<str>>(raw: &[S]) -> Vec<Vec<String>> {
    let mut patterns: Vec<Vec<String>> = Vec::new();
    for entry in raw {
        let folded = tokens(&fold_text(entry.as_ref()));
        if folded.is_empty() {
            tracing::warn!(rule = entry.as_ref(), "Skipping normalization rule with no comparable text");
            continue;
        }
        if !patterns.contains(&folded) {
            patterns.push(folded);
        }
    }
    // Longest first; stable sort keeps configured order among equals
    patterns.sort_by(|a, b| b.len().cmp(&a.len()));
    patterns
}

/// Name and address noise rules
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationRules {
    pub name: FieldRules,
    pub address: FieldRules,
}

impl Default for NormalizationRules {
    /// Hotel-name and Korean-region rules used for the Jeju/Seoul/Busan catalogue
    fn default() -> Self {
        Self {
            name: FieldRules::new(
                &["hotel"],
                &[
                    "by best western signature collection",
                    "by best western",
                    "best western",
                    "signature collection",
                ],
                &[
                    "jeju",
                    "seoul",
                    "busan",
                    "downtown jeju",
                    "hongdae",
                    "myeong-dong",
                    "dongdaemun",
                    "gangseo",
                    "songpa",
                    "jung-gu",
                    "mapo-gu",
                    "haeundae-gu",
                ],
            ),
            address: FieldRules::new(
                &["room"],
                &[],
                &[
                    "mapo-gu",
                    "jung-gu",
                    "songpa",
                    "gangseo",
                    "haeundae-gu",
                    "dongdaemun",
                    "hongdae",
                    "downtown jeju",
                    "jeju-si",
                    "busan",
                    "seoul",
                    "korea",
                    "south korea",
                    "jeju-do",
                ],
            ),
        }
    }
}

impl NormalizationRules {
    /// Build rules from the `[rules]` section; absent tables keep the defaults
    pub fn from_section(section: &RulesSection) -> Self {
        let defaults = Self::default();
        Self {
            name: section
                .name
                .as_ref()
                .map(FieldRules::from_section)
                .unwrap_or(defaults.name),
            address: section
                .address
                .as_ref()
                .map(FieldRules::from_section)
                .unwrap_or(defaults.address),
        }
    }

    /// No stripping at all
    pub fn none() -> Self {
        Self {
            name: FieldRules::default(),
            address: FieldRules::default(),
        }
    }
}

/// Validated coordinate pair in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Normalized coordinate state
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateField {
    Valid(Coordinates),
    /// Not supplied, or the (0, 0) placeholder
    Missing,
    /// Supplied but unusable
    Malformed(String),
}

impl CoordinateField {
    fn from_raw(latitude: Option<f64>, longitude: Option<f64>) -> Self {
        match (latitude, longitude) {
            (None, None) => CoordinateField::Missing,
            (Some(_), None) | (None, Some(_)) => {
                CoordinateField::Malformed("only one of latitude/longitude supplied".to_string())
            }
            (Some(lat), Some(lon)) => {
                if !lat.is_finite() || !lon.is_finite() {
                    CoordinateField::Malformed(format!("non-finite coordinates ({}, {})", lat, lon))
                } else if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    CoordinateField::Malformed(format!("coordinates out of range ({}, {})", lat, lon))
                } else if lat == 0.0 && lon == 0.0 {
                    CoordinateField::Missing
                } else {
                    CoordinateField::Valid(Coordinates {
                        latitude: lat,
                        longitude: lon,
                    })
                }
            }
        }
    }

    pub fn valid(&self) -> Option<Coordinates> {
        match self {
            CoordinateField::Valid(c) => Some(*c),
            _ => None,
        }
    }
}

/// Address split into comma-separated components
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAddress {
    /// All remaining tokens joined by single spaces
    pub full: String,
    /// Remaining components, each a space-joined token string
    pub components: Vec<String>,
}

/// Comparison-ready view of one record
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    /// Folded name with noise tokens removed
    pub name: String,
    pub name_tokens: Vec<String>,
    pub address: Option<NormalizedAddress>,
    pub postal_code: Option<String>,
    pub coordinates: CoordinateField,
}

/// Applies folding and noise rules to local and remote records
#[derive(Debug, Clone, Default)]
pub struct FieldNormalizer {
    rules: NormalizationRules,
}

impl FieldNormalizer {
    pub fn new(rules: NormalizationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &NormalizationRules {
        &self.rules
    }

    pub fn normalize_local(&self, record: &LocalHotelRecord) -> MatchResult<NormalizedRecord> {
        self.normalize(
            RecordSide::Local,
            &record.name,
            record.address.as_deref(),
            record.postal_code.as_deref(),
            record.latitude,
            record.longitude,
        )
    }

    pub fn normalize_remote(&self, record: &RemoteListingRecord) -> MatchResult<NormalizedRecord> {
        self.normalize(
            RecordSide::Remote,
            &record.name,
            record.address.as_deref(),
            record.postal_code.as_deref(),
            record.latitude,
            record.longitude,
        )
    }

    fn normalize(
        &self,
        side: RecordSide,
        name: &str,
        address: Option<&str>,
        postal_code: Option<&str>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> MatchResult<NormalizedRecord> {
        let name_tokens = self.normalize_name(name).ok_or_else(|| MatchError::InvalidRecord {
            side,
            reason: format!("name {:?} has no comparable text", name),
        })?;

        Ok(NormalizedRecord {
            name: name_tokens.join(" "),
            name_tokens,
            address: address.and_then(|a| self.normalize_address(a)),
            postal_code: postal_code.and_then(normalize_postal_code),
            coordinates: CoordinateField::from_raw(latitude, longitude),
        })
    }

    /// Folded name tokens; None when the name has no alphanumeric content
    fn normalize_name(&self, raw: &str) -> Option<Vec<String>> {
        let folded = tokens(&fold_text(raw));
        if folded.is_empty() {
            return None;
        }

        let stripped = self.rules.name.strip(&folded);
        if stripped.is_empty() {
            // Never let the rules make a name unscorable
            Some(folded)
        } else {
            Some(stripped)
        }
    }

    fn normalize_address(&self, raw: &str) -> Option<NormalizedAddress> {
        let folded_components: Vec<Vec<String>> = raw
            .split(|c| c == ',' || c == ';' || c == '\n')
            .map(|part| tokens(&fold_text(part)))
            .filter(|part| !part.is_empty())
            .collect();

        if folded_components.is_empty() {
            return None;
        }

        let stripped: Vec<Vec<String>> = folded_components
            .iter()
            .filter(|component| !self.rules.address.is_place(component))
            .map(|component| self.rules.address.strip(component))
            .filter(|component| !component.is_empty())
            .collect();

        let kept = if stripped.is_empty() {
            folded_components
        } else {
            stripped
        };

        let components: Vec<String> = kept.iter().map(|c| c.join(" ")).collect();
        Some(NormalizedAddress {
            full: components.join(" "),
            components,
        })
    }
}

/// Strip separators from a postal code; None when nothing remains
pub fn normalize_postal_code(raw: &str) -> Option<String> {
    let code: String = fold_text(raw).chars().filter(|c| c.is_alphanumeric()).collect();
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}
