//! Canonicalization keys for raw company names.
//!
//! A [`CanonicalKey`] is the first grouping signal of a resolution run: two
//! mentions whose raw names produce equal keys are candidates for the same
//! canonical company. Key derivation is pure and total. The steps run in a
//! fixed order:
//!
//! 1. trim surrounding whitespace and case-fold,
//! 2. collapse internal whitespace runs to a single space,
//! 3. strip trailing legal-entity suffix tokens (`Ltd`, `Pvt.`, `Inc` ...),
//! 4. fold dotted acronyms (`S.B.I.` becomes `sbi`) and drop apostrophes,
//! 5. replace any other punctuation with a space, keeping `&` only when it
//!    sits inside a token (`l&t`, `at&t`).
//!
//! When nothing survives (the name was all punctuation or only a suffix) the
//! key falls back to the trimmed, lower-cased, whitespace-collapsed raw text.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref DOTTED_ACRONYM: Regex = Regex::new(r"\b(?:\p{L}\.){2,}").unwrap();
    static ref APOSTROPHE: Regex = Regex::new(r"['\u{2018}\u{2019}]").unwrap();
    static ref NON_KEY_CHARS: Regex = Regex::new(r"[^\p{L}\p{N}&]+").unwrap();
    static ref NON_ALNUM_ASCII: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

pub const LEGAL_SUFFIXES: [&str; 12] = [
    "limited",
    "ltd",
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "company",
    "co",
    "private",
    "pvt",
    "plc",
    "llc",
];

// words that never contribute a letter to an acronym
const INITIALS_STOPWORDS: [&str; 5] = ["of", "and", "the", "&", "for"];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ').filter(|t| !t.is_empty())
    }
    /// First letters of the significant tokens, used to match acronyms
    /// against full names.
    pub fn initials(&self) -> String {
        self.tokens()
            .filter(|t| !INITIALS_STOPWORDS.contains(t))
            .filter_map(|t| t.chars().next())
            .collect()
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CanonicalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_legal_suffix(token: &str) -> bool {
    let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric());
    let mut parts = trimmed.split('.').filter(|p| !p.is_empty()).peekable();
    parts.peek().is_some() && parts.all(|p| LEGAL_SUFFIXES.contains(&p))
}

pub fn canonical_key(raw: &str) -> CanonicalKey {
    let folded = raw.trim().to_lowercase();
    let collapsed = WHITESPACE.replace_all(&folded, " ");

    let mut tokens: Vec<&str> = collapsed.split(' ').filter(|t| !t.is_empty()).collect();
    while tokens.len() > 1 && tokens.last().is_some_and(|t| is_legal_suffix(t)) {
        tokens.pop();
    }
    let joined = tokens.join(" ");

    let joined = DOTTED_ACRONYM.replace_all(&joined, |caps: &regex::Captures| caps[0].replace('.', ""));
    let joined = APOSTROPHE.replace_all(&joined, "");
    let stripped = NON_KEY_CHARS.replace_all(&joined, " ");

    let key = stripped
        .split(' ')
        .map(|t| t.trim_matches('&'))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if key.is_empty() {
        return CanonicalKey(collapsed.into_owned());
    }
    CanonicalKey(key)
}

/// Loose key used for label lists (non-company rules, baseline exclusions):
/// lower-case ASCII alphanumerics separated by single spaces.
pub fn loose_name_key(raw: &str) -> String {
    NON_ALNUM_ASCII
        .replace_all(&raw.to_lowercase(), " ")
        .trim()
        .to_string()
}

pub fn slugify(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let slug = NON_ALNUM_ASCII.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        String::from("unknown")
    } else {
        slug.to_string()
    }
}

/// True for names written as a bare acronym: 2 to 6 upper-case letters,
/// optionally dotted (`SBI`, `L.I.C.`).
pub fn looks_like_acronym(raw: &str) -> bool {
    let compact: String = raw.trim().chars().filter(|c| *c != '.').collect();
    let len = compact.chars().count();
    (2..=6).contains(&len) && compact.chars().all(|c| c.is_uppercase())
}
