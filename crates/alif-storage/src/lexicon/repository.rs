use alif_core::{Lemma, LemmaId, LexiconRepository, Root, RootId};
use async_trait::async_trait;
use sqlx::SqlitePool;

use super::models::{category_str, cefr_str, pos_str, LemmaRow, RootRow};

/// Backs the relatively-static Root/Lemma graph in `lexicon.db` (§3, §6),
/// analogous to the teacher's `SqliteContentRepository` over its read-mostly
/// Quran graph.
pub struct SqliteLexiconRepository {
    pool: SqlitePool,
}

impl SqliteLexiconRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LexiconRepository for SqliteLexiconRepository {
    async fn get_root(&self, id: RootId) -> anyhow::Result<Option<Root>> {
        let row: Option<RootRow> = sqlx::query_as("SELECT id, radicals, gloss FROM roots WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(RootRow::into_domain))
    }

    async fn insert_root(&self, root: &Root) -> anyhow::Result<RootId> {
        let radicals: String = root.radicals.iter().collect();
        let result = sqlx::query("INSERT INTO roots (radicals, gloss) VALUES (?, ?)")
            .bind(&radicals)
            .bind(&root.gloss)
            .execute(&self.pool)
            .await?;
        Ok(RootId(result.last_insert_rowid()))
    }

    async fn get_lemma(&self, id: LemmaId) -> anyhow::Result<Option<Lemma>> {
        let row: Option<LemmaRow> = sqlx::query_as(
            "SELECT id, bare, diacritized, pos, root_id, gloss, frequency_rank, cefr_band,
                    category, inflected_forms, canonical_lemma_id
             FROM lemmas WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(LemmaRow::into_domain).transpose().map_err(Into::into)
    }

    async fn find_lemma_by_bare(&self, bare: &str) -> anyhow::Result<Option<Lemma>> {
        let row: Option<LemmaRow> = sqlx::query_as(
            "SELECT id, bare, diacritized, pos, root_id, gloss, frequency_rank, cefr_band,
                    category, inflected_forms, canonical_lemma_id
             FROM lemmas WHERE bare = ?",
        )
        .bind(bare)
        .fetch_optional(&self.pool)
        .await?;
        row.map(LemmaRow::into_domain).transpose().map_err(Into::into)
    }

    /// §4.1 step (e): scans each lemma's inflected-form index. SQLite has no
    /// native JSON-map membership index at this scale, so this loads the
    /// (small, read-mostly) lemma table and filters in process.
    async fn find_lemma_by_inflected_form(&self, surface: &str) -> anyhow::Result<Option<Lemma>> {
        let rows: Vec<LemmaRow> = sqlx::query_as(
            "SELECT id, bare, diacritized, pos, root_id, gloss, frequency_rank, cefr_band,
                    category, inflected_forms, canonical_lemma_id
             FROM lemmas WHERE inflected_forms LIKE '%' || ? || '%'",
        )
        .bind(surface)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let lemma = row.into_domain()?;
            if lemma.inflected_forms.contains_key(surface) {
                return Ok(Some(lemma));
            }
        }
        Ok(None)
    }

    async fn insert_lemma(&self, lemma: &Lemma) -> anyhow::Result<LemmaId> {
        let inflected_forms = serde_json::to_string(&lemma.inflected_forms)?;
        let result = sqlx::query(
            "INSERT INTO lemmas
                (bare, diacritized, pos, root_id, gloss, frequency_rank, cefr_band, category,
                 inflected_forms, canonical_lemma_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lemma.bare)
        .bind(&lemma.diacritized)
        .bind(pos_str(lemma.pos))
        .bind(lemma.root.map(|r| r.0))
        .bind(&lemma.gloss)
        .bind(lemma.frequency_rank.map(|r| r as i64))
        .bind(lemma.cefr_band.map(cefr_str))
        .bind(category_str(lemma.category))
        .bind(&inflected_forms)
        .bind(lemma.canonical_lemma.map(|l| l.0))
        .execute(&self.pool)
        .await?;
        Ok(LemmaId(result.last_insert_rowid()))
    }

    async fn update_lemma(&self, lemma: &Lemma) -> anyhow::Result<()> {
        let inflected_forms = serde_json::to_string(&lemma.inflected_forms)?;
        sqlx::query(
            "UPDATE lemmas SET
                bare = ?, diacritized = ?, pos = ?, root_id = ?, gloss = ?, frequency_rank = ?,
                cefr_band = ?, category = ?, inflected_forms = ?, canonical_lemma_id = ?
             WHERE id = ?",
        )
        .bind(&lemma.bare)
        .bind(&lemma.diacritized)
        .bind(pos_str(lemma.pos))
        .bind(lemma.root.map(|r| r.0))
        .bind(&lemma.gloss)
        .bind(lemma.frequency_rank.map(|r| r as i64))
        .bind(lemma.cefr_band.map(cefr_str))
        .bind(category_str(lemma.category))
        .bind(&inflected_forms)
        .bind(lemma.canonical_lemma.map(|l| l.0))
        .bind(lemma.id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_lemmas_by_root(&self, root: RootId) -> anyhow::Result<Vec<Lemma>> {
        let rows: Vec<LemmaRow> = sqlx::query_as(
            "SELECT id, bare, diacritized, pos, root_id, gloss, frequency_rank, cefr_band,
                    category, inflected_forms, canonical_lemma_id
             FROM lemmas WHERE root_id = ?",
        )
        .bind(root.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LemmaRow::into_domain).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn find_variants_of(&self, canonical: LemmaId) -> anyhow::Result<Vec<Lemma>> {
        let rows: Vec<LemmaRow> = sqlx::query_as(
            "SELECT id, bare, diacritized, pos, root_id, gloss, frequency_rank, cefr_band,
                    category, inflected_forms, canonical_lemma_id
             FROM lemmas WHERE canonical_lemma_id = ?",
        )
        .bind(canonical.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LemmaRow::into_domain).collect::<Result<_, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alif_core::{PartOfSpeech, WordCategory};
    use std::collections::HashMap;

    async fn setup() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations_lexicon").run(&pool).await.unwrap();
        pool
    }

    fn sample_lemma(bare: &str) -> Lemma {
        Lemma {
            id: LemmaId(0),
            bare: bare.to_string(),
            diacritized: None,
            pos: PartOfSpeech::Noun,
            root: None,
            gloss: "book".to_string(),
            frequency_rank: None,
            cefr_band: None,
            category: WordCategory::Standard,
            inflected_forms: HashMap::new(),
            canonical_lemma: None,
        }
    }

    #[tokio::test]
    async fn insert_and_find_by_bare() {
        let pool = setup().await;
        let repo = SqliteLexiconRepository::new(pool);
        let id = repo.insert_lemma(&sample_lemma("كتاب")).await.unwrap();
        let found = repo.find_lemma_by_bare("كتاب").await.unwrap().unwrap();
        assert_eq!(found.id, id);
    }

    #[tokio::test]
    async fn find_variants_of_returns_variant_lemmas() {
        let pool = setup().await;
        let repo = SqliteLexiconRepository::new(pool);
        let canonical = repo.insert_lemma(&sample_lemma("كتب")).await.unwrap();
        let mut variant = sample_lemma("كاتب");
        variant.canonical_lemma = Some(canonical);
        repo.insert_lemma(&variant).await.unwrap();

        let variants = repo.find_variants_of(canonical).await.unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].bare, "كاتب");
    }
}
