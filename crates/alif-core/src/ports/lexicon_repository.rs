use async_trait::async_trait;

use crate::domain::{Lemma, LemmaId, Root, RootId};

/// The relatively-static Root/Lemma graph (§3, §6 persistence layout). Backed
/// by `lexicon.db` in `alif-storage`, analogous to the teacher's
/// `ContentRepository` over its read-mostly Quran graph.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LexiconRepository: Send + Sync {
    async fn get_root(&self, id: RootId) -> anyhow::Result<Option<Root>>;

    async fn insert_root(&self, root: &Root) -> anyhow::Result<RootId>;

    async fn get_lemma(&self, id: LemmaId) -> anyhow::Result<Option<Lemma>>;

    /// Direct lookup by bare (diacritic-free) surface form — §4.1 step (c).
    async fn find_lemma_by_bare(&self, bare: &str) -> anyhow::Result<Option<Lemma>>;

    /// Inflected-form index lookup — §4.1 step (e). Scans each candidate
    /// lemma's `inflected_forms` map for a matching surface key.
    async fn find_lemma_by_inflected_form(&self, surface: &str) -> anyhow::Result<Option<Lemma>>;

    async fn insert_lemma(&self, lemma: &Lemma) -> anyhow::Result<LemmaId>;

    async fn update_lemma(&self, lemma: &Lemma) -> anyhow::Result<()>;

    /// Lemmas sharing a root, used by the auto-introducer to detect a
    /// "freshly-failed sibling" (§4.7) and by sentence backfill grouping
    /// constraints (§4.5: "never pair two words sharing a root").
    async fn find_lemmas_by_root(&self, root: RootId) -> anyhow::Result<Vec<Lemma>>;

    /// All lemmas pointing at `canonical` via `canonical_lemma` (§4.1
    /// `mark_variants`).
    async fn find_variants_of(&self, canonical: LemmaId) -> anyhow::Result<Vec<Lemma>>;
}
