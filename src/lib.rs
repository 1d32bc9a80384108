//! Chatter – entity resolution for company mentions in a newsletter archive.
//!
//! Extraction hands over a flat list of *mentions*: one company name seen in
//! one edition, optionally with a quote. The same company shows up under many
//! spellings (`SBI`, `S.B.I.`, `State Bank of India Ltd`), and a few different
//! companies look alike. This crate decides which mentions belong together.
//!
//! * [`key`] – the canonicalization key every raw name is compared by.
//! * [`rules`] – declarative alias ("must merge") and block ("must never
//!   merge") rules, validated into an immutable [`rules::RuleSet`].
//! * [`sanity`] – removal of labels that are not companies at all.
//! * [`resolve`] – the [`resolve::Resolver`] that buckets, merges and
//!   quarantines, producing [`construct::CanonicalCompany`] values plus a
//!   [`construct::ResolutionReport`].
//! * [`validate`] – the regression gate against a committed
//!   [`validate::Baseline`].
//! * [`persist`], [`settings`] and [`pipeline`] – file I/O and orchestration.
//!
//! Merging is precision first: two names merge only through an identical key
//! or an alias rule, and never when a block rule or differing market keys
//! separate them. Anything unsafe is kept apart and recorded.
//!
//! ## Quick Start
//! ```
//! use chatter::construct::Mention;
//! use chatter::resolve::resolve;
//! use chatter::rules::{AliasRule, RuleSet};
//!
//! let rules = RuleSet::new(vec![AliasRule::new("SBI", "State Bank of India")], vec![]).unwrap();
//! let mentions = vec![
//!     Mention::new("SBI", "p-one"),
//!     Mention::new("State Bank of India", "p-two"),
//! ];
//! let resolution = resolve(&mentions, &rules);
//! assert_eq!(resolution.companies.len(), 1);
//! assert_eq!(resolution.companies[0].display_name, "State Bank of India");
//! ```

pub mod construct;
pub mod error;
pub mod key;
pub mod persist;
pub mod pipeline;
pub mod resolve;
pub mod rules;
pub mod sanity;
pub mod settings;
pub mod validate;

pub use error::{ChatterError, Result};
