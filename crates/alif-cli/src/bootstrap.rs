//! Wires the local SQLite repositories and scheduler components into one
//! `AppContext`, mirroring the teacher's `schedule.rs` pattern of reading
//! database paths from the environment and constructing repositories
//! in-process rather than going through a remote server.

use std::sync::Arc;

use alif_core::{
    AcquisitionScheduler, AutoIntroController, FsrsScheduler, IdentityResolver,
    KnowledgeRepository, LexiconRepository, MaterialManager, MorphologicalAnalyzer,
    SchedulerConfig, SentenceGenerator, SentenceReviewer, SessionBuilder, VariantOracle,
};
use alif_storage::oracles::{
    HttpMorphologicalAnalyzer, HttpSentenceGenerator, HttpSentenceReviewer, HttpVariantOracle,
};
use alif_storage::{init_knowledge_db, init_lexicon_db, SqliteKnowledgeRepository, SqliteLexiconRepository};
use anyhow::Result;

pub struct AppContext {
    pub knowledge: Arc<dyn KnowledgeRepository>,
    pub lexicon: Arc<dyn LexiconRepository>,
    pub identity: Arc<IdentityResolver>,
    pub acquisition: Arc<AcquisitionScheduler>,
    pub fsrs: Arc<FsrsScheduler>,
    pub introducer: Arc<AutoIntroController>,
    pub material: Arc<MaterialManager>,
    pub session_builder: Arc<SessionBuilder>,
    pub config: SchedulerConfig,
}

/// Reads an optional oracle endpoint from the environment. Oracles are
/// unconfigured by default — the resolver and material pipeline degrade
/// gracefully per §4.1/§4.5 failure semantics rather than require them.
fn env_endpoint(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

impl AppContext {
    pub async fn load() -> Result<Self> {
        let lexicon_db_path =
            std::env::var("LEXICON_DB_PATH").unwrap_or_else(|_| "data/lexicon.db".to_string());
        let knowledge_db_path =
            std::env::var("KNOWLEDGE_DB_PATH").unwrap_or_else(|_| "data/knowledge.db".to_string());

        if let Some(parent) = std::path::Path::new(&lexicon_db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = std::path::Path::new(&knowledge_db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lexicon_pool = init_lexicon_db(&lexicon_db_path).await?;
        let knowledge_pool = init_knowledge_db(&knowledge_db_path).await?;

        let lexicon: Arc<dyn LexiconRepository> = Arc::new(SqliteLexiconRepository::new(lexicon_pool));
        let knowledge: Arc<dyn KnowledgeRepository> =
            Arc::new(SqliteKnowledgeRepository::new(knowledge_pool));

        let analyzer: Option<Arc<dyn MorphologicalAnalyzer>> = env_endpoint("ANALYZER_URL")
            .map(|url| Arc::new(HttpMorphologicalAnalyzer::new(url)) as Arc<dyn MorphologicalAnalyzer>);
        let variant_oracle: Option<Arc<dyn VariantOracle>> = env_endpoint("VARIANT_ORACLE_URL")
            .map(|url| Arc::new(HttpVariantOracle::new(url)) as Arc<dyn VariantOracle>);
        let generator: Option<Arc<dyn SentenceGenerator>> = env_endpoint("SENTENCE_GENERATOR_URL")
            .map(|url| Arc::new(HttpSentenceGenerator::new(url)) as Arc<dyn SentenceGenerator>);
        let reviewer: Option<Arc<dyn SentenceReviewer>> = env_endpoint("SENTENCE_REVIEWER_URL")
            .map(|url| Arc::new(HttpSentenceReviewer::new(url)) as Arc<dyn SentenceReviewer>);

        let config = SchedulerConfig::default();

        let identity = Arc::new(IdentityResolver::new(
            lexicon.clone(),
            knowledge.clone(),
            variant_oracle,
            analyzer,
        ));
        let acquisition = Arc::new(AcquisitionScheduler::new(knowledge.clone(), config.clone()));
        let fsrs = Arc::new(FsrsScheduler::new(knowledge.clone(), config.clone()));
        let introducer = Arc::new(AutoIntroController::new(
            knowledge.clone(),
            lexicon.clone(),
            acquisition.clone(),
            config.clone(),
        ));
        let material = Arc::new(MaterialManager::new(
            knowledge.clone(),
            lexicon.clone(),
            identity.clone(),
            generator,
            reviewer,
            config.material.clone(),
        ));
        let session_builder = Arc::new(SessionBuilder::new(
            knowledge.clone(),
            lexicon.clone(),
            material.clone(),
            introducer.clone(),
            fsrs.clone(),
            config.clone(),
        ));

        Ok(Self {
            knowledge,
            lexicon,
            identity,
            acquisition,
            fsrs,
            introducer,
            material,
            session_builder,
            config,
        })
    }
}
