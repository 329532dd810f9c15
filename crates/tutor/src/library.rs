use std::collections::HashMap;

use encore_domain::{parse_musicxml, ParsedScore};
use tracing::debug;

use crate::error::SessionError;

/// Resolves score ids to parsed scores.
pub trait ScoreLibrary: Send + Sync {
    fn load(&self, id: &str) -> Result<ParsedScore, SessionError>;

    fn ids(&self) -> Vec<String>;
}

/// Raw MusicXML documents kept in memory, parsed on every load.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLibrary {
    documents: HashMap<String, String>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, document: impl Into<String>) {
        self.documents.insert(id.into(), document.into());
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl ScoreLibrary for InMemoryLibrary {
    fn load(&self, id: &str) -> Result<ParsedScore, SessionError> {
        let document = self
            .documents
            .get(id)
            .ok_or_else(|| SessionError::UnknownScore(id.to_string()))?;
        let score = parse_musicxml(document)?;
        debug!(score_id = id, measures = score.total_measures, "score loaded");
        Ok(score)
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.documents.keys().cloned().collect();
        ids.sort();
        ids
    }
}
