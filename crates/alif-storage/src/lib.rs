pub mod error;
pub mod knowledge;
pub mod lexicon;
pub mod oracles;
pub mod version;

pub use error::{Result, StorageError};
pub use knowledge::{init_knowledge_db, SqliteKnowledgeRepository};
pub use lexicon::{init_lexicon_db, open_lexicon_db_readonly, SqliteLexiconRepository};
