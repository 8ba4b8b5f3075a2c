pub mod auto_match;
pub mod matching_engine;
pub mod reconciliation_service;

pub use auto_match::{AutoMatchReport, AutoMatcher, ExactAutoMatcher, RemoteAutoMatcher};
pub use matching_engine::{MatchBadge, MatchCandidate, MatchingEngine, ProposedLink};
pub use reconciliation_service::ReconciliationService;
