//! Tantivy-based search index module.
//!
//! Full-text search over post bodies, tags and author usernames.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::Post;

const BOOST_TAGS: f32 = 4.0;
const BOOST_AUTHOR: f32 = 3.0;
const BOOST_BODY: f32 = 1.0;

/// Search hit with relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub post_id: String,
    pub score: f32,
}

struct SearchFields {
    post_id: Field,
    body: Field,
    tags: Field,
    author: Field,
}

/// Tantivy search index for posts.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        // STRING keeps the id as one untokenized term so delete_term matches it.
        let post_id = schema_builder.add_text_field("post_id", STRING | STORED);
        let body = schema_builder.add_text_field("body", TEXT);
        let tags = schema_builder.add_text_field("tags", TEXT);
        let author = schema_builder.add_text_field("author", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            post_id,
            body,
            tags,
            author,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from posts.
    pub async fn rebuild(&self, posts: &[Post]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for post in posts {
            writer.add_document(self.create_document(post))?;
        }
        writer.commit()?;
        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} posts", posts.len());
        Ok(())
    }

    /// Index or re-index a single post.
    pub async fn index_post(&self, post: &Post) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.post_id, &post.id);
        writer.delete_term(term);
        writer.add_document(self.create_document(post))?;
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Remove a post from the index.
    pub async fn remove_post(&self, post_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.post_id, post_id);
        writer.delete_term(term);
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Search for posts matching the query.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, AppError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![self.fields.body, self.fields.tags, self.fields.author],
        );
        let base_query = query_parser
            .parse_query(query_str)
            .map_err(|e| AppError::Search(format!("Invalid search query: {}", e)))?;

        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (field, boost) in [
            (self.fields.tags, BOOST_TAGS),
            (self.fields.author, BOOST_AUTHOR),
            (self.fields.body, BOOST_BODY),
        ] {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                subqueries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        let combined_query = if subqueries.is_empty() {
            base_query
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        let top_docs = searcher
            .search(&combined_query, &TopDocs::with_limit(limit + offset))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let post_id = doc.get_first(self.fields.post_id)?.as_str()?.to_string();
                Some(SearchResult { post_id, score })
            })
            .collect();

        Ok(results)
    }

    fn create_document(&self, post: &Post) -> TantivyDocument {
        doc!(
            self.fields.post_id => post.id.clone(),
            self.fields.body => post.body.clone(),
            self.fields.tags => post.tags.join(" "),
            self.fields.author => post.author_username.clone()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn post(id: &str, author: &str, body: &str, tags: &[&str]) -> Post {
        Post {
            id: id.to_string(),
            author_id: format!("id-{}", author),
            author_username: author.to_string(),
            body: body.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            attachments: Vec::new(),
            like_count: 0,
            comment_count: 0,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_search_posts() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        index
            .rebuild(&[
                post("p1", "alice", "Integrals cheat sheet", &["calculus"]),
                post("p2", "bob", "Lab report template", &["chemistry"]),
            ])
            .await
            .unwrap();

        let results = index.search("integrals", 10, 0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].post_id, "p1");

        let results = index.search("chemistry", 10, 0).unwrap();
        assert_eq!(results[0].post_id, "p2");
    }

    #[tokio::test]
    async fn test_remove_post() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        index
            .index_post(&post("p1", "alice", "Exam schedule", &[]))
            .await
            .unwrap();
        assert_eq!(index.search("exam", 10, 0).unwrap().len(), 1);

        index.remove_post("p1").await.unwrap();
        assert!(index.search("exam", 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let results = index.search("", 10, 0).unwrap();
        assert!(results.is_empty());
    }
}
