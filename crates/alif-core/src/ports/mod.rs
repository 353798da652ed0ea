pub mod knowledge_repository;
pub mod lexicon_repository;
pub mod oracles;

pub use knowledge_repository::KnowledgeRepository;
pub use lexicon_repository::LexiconRepository;
pub use oracles::{
    GeneratedSentence, MorphologicalAnalysis, MorphologicalAnalyzer, ReviewVerdict,
    SentenceGenerationRequest, SentenceGenerator, SentenceReview, SentenceReviewer, VariantOracle,
};
