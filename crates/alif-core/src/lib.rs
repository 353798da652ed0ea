pub mod acquisition;
pub mod config;
pub mod domain;
pub mod fsrs;
pub mod identity;
pub mod introduction;
pub mod leech;
pub mod material;
pub mod ports;
pub mod session;

pub use acquisition::{AcquisitionOutcome, AcquisitionScheduler};
pub use config::SchedulerConfig;
pub use domain::{
    AcquisitionBox, CefrBand, ComprehensibilityClass, ComprehensionRating, CreditType,
    DomainError, DomainResult, FsrsCard, KnowledgeRecord, KnowledgeRecordSnapshot, Lemma, LemmaId,
    OracleError, PartOfSpeech, Rating, ReviewLog, ReviewLogId, Root, RootId, SchedulerKind,
    Sentence, SentenceId, SentenceReviewSubmission, SentenceSource, SentenceToken, Session,
    SessionItem, VariantDecision, VariantStats, VariantVerdict, WordCategory, WordSource,
    WordState,
};
pub use fsrs::{FsrsOutcome, FsrsScheduler};
pub use identity::IdentityResolver;
pub use introduction::{AutoIntroController, IntroductionAllowance};
pub use material::{MaterialManager, PipelineReport};
pub use ports::{
    GeneratedSentence, KnowledgeRepository, LexiconRepository, MorphologicalAnalysis,
    MorphologicalAnalyzer, SentenceGenerationRequest, SentenceGenerator, SentenceReview,
    SentenceReviewer, ReviewVerdict, VariantOracle,
};
pub use session::SessionBuilder;

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! Re-exports of `mockall`-generated mocks for the repository and oracle
    //! ports, mirroring the teacher's `testing::MockContentRepository` /
    //! `MockUserRepository` module.
    pub use crate::ports::knowledge_repository::MockKnowledgeRepository;
    pub use crate::ports::lexicon_repository::MockLexiconRepository;
    pub use crate::ports::oracles::{
        MockMorphologicalAnalyzer, MockSentenceGenerator, MockSentenceReviewer, MockVariantOracle,
    };
}
