pub mod corpus;
pub mod search;

pub use corpus::{CorpusIndex, IndexOptions, KeywordScope};
pub use search::RerankedHit;
