//! Email discovery: candidate extraction, ranking and per-site resolution.

pub mod extract;
pub mod rank;
pub mod site;

pub use extract::{CandidateSet, EmailCandidate, EmailFilter, Provenance};
pub use rank::{EmailRanker, ScoredEmail};
pub use site::{EmailResolver, HttpProbe, LinkProbe, SiteResolver};

/// Result string for a site with no usable email.
pub const NONE_FOUND: &str = "NA";
