pub mod domain;
pub mod engine;

pub use domain::{
    are_similar, extract_keywords, MatchResult, MatchType, SharedItem, TieBreak,
    DEFAULT_SIMILARITY_THRESHOLD,
};
pub use engine::{EngineError, MatchEngine};
