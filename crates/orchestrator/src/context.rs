//! Run context: user profile, conversation history, the advisory vector
//! reference, and the collaborators that supply them.

use async_trait::async_trait;
use queryforge_common::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// Coarse reliability label for an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ConfidenceLevel::Low => 0,
            ConfidenceLevel::Medium => 1,
            ConfidenceLevel::High => 2,
        }
    }

    /// The lower of `self` and `ceiling`
    pub fn capped_at(self, ceiling: ConfidenceLevel) -> ConfidenceLevel {
        if self.rank() > ceiling.rank() {
            ceiling
        } else {
            self
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Vi,
    En,
}

impl Language {
    /// Parse a language code; anything that is not English is treated as Vietnamese
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_ascii_lowercase();
        if code == "en" || code.starts_with("en-") || code.starts_with("en_") {
            Language::En
        } else {
            Language::Vi
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Vi => "Vietnamese",
            Language::En => "English",
        }
    }
}

/// Previewed content of one retrieved chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkContent {
    pub chunk_id: String,
    pub title: String,
    pub content: String,
    /// Similarity score, when the retriever reports one
    #[serde(default)]
    pub score: Option<f32>,
}

/// Advisory vector-search signal for the current query.
///
/// Never a gate: the decision engine reads it as evidence only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchReference {
    pub max_score: f32,
    /// Chunk ids, best first
    pub top_chunks: Vec<String>,
    pub chunk_contents: Vec<ChunkContent>,
    pub search_time_ms: u64,
}

impl VectorSearchReference {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_contents.is_empty() && self.top_chunks.is_empty()
    }

    /// The first `n` chunks
    pub fn top(&self, n: usize) -> Vec<ChunkContent> {
        self.chunk_contents.iter().take(n).cloned().collect()
    }
}

/// Who is asking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    /// Preferred answer language code (vi, en)
    pub language: Option<String>,
    /// Free-form profile: student id, class, faculty, ...
    #[serde(default)]
    pub profile: BTreeMap<String, String>,
}

impl UserContext {
    /// Resolve the answer language, using `default_code` when none is set
    pub fn language_or(&self, default_code: &str) -> Language {
        Language::from_code(self.language.as_deref().unwrap_or(default_code))
    }

    /// Render the profile for prompts; empty when nothing is known
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        if let Some(name) = &self.display_name {
            lines.push(format!("name: {}", name));
        }
        for (key, value) in &self.profile {
            lines.push(format!("{}: {}", key, value));
        }
        lines.join("\n")
    }
}

/// One message of recent conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Render turns oldest first, one per line
pub fn render_history(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Image attached to the query
#[derive(Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub format: String,
    pub question: Option<String>,
}

impl fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageInput")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("format", &self.format)
            .field("question", &self.question)
            .finish()
    }
}

/// Everything one orchestration run starts from
#[derive(Debug, Clone)]
pub struct OrchestrationRequest {
    pub session_id: String,
    pub message_id: Uuid,
    pub query: String,
    pub user_context: UserContext,
    pub vector_reference: VectorSearchReference,
    /// Recent turns, oldest first
    pub history: Vec<ConversationTurn>,
    pub image: Option<ImageInput>,
}

impl OrchestrationRequest {
    pub fn new(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message_id: Uuid::new_v4(),
            query: query.into(),
            user_context: UserContext::default(),
            vector_reference: VectorSearchReference::empty(),
            history: Vec::new(),
            image: None,
        }
    }

    pub fn with_user_context(mut self, user_context: UserContext) -> Self {
        self.user_context = user_context;
        self
    }

    pub fn with_vector_reference(mut self, reference: VectorSearchReference) -> Self {
        self.vector_reference = reference;
        self
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.image = Some(image);
        self
    }
}

/// Supplies recent conversation turns for a session
#[async_trait]
pub trait ConversationHistoryProvider: Send + Sync {
    /// The last `limit` turns, oldest first
    async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<ConversationTurn>>;
}

/// Supplies the vector-search reference for a query
#[async_trait]
pub trait VectorReferenceProvider: Send + Sync {
    async fn reference(&self, query: &str) -> Result<VectorSearchReference>;
}

/// History kept in process memory
#[derive(Default)]
pub struct InMemoryHistory {
    sessions: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, session_id: &str, turn: ConversationTurn) {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(turn);
    }
}

#[async_trait]
impl ConversationHistoryProvider for InMemoryHistory {
    async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let sessions = self.sessions.read().await;
        let turns = sessions.get(session_id).map(Vec::as_slice).unwrap_or_default();
        let skip = turns.len().saturating_sub(limit);
        Ok(turns[skip..].to_vec())
    }
}

/// Returns the same reference for every query
#[derive(Debug, Clone, Default)]
pub struct StaticVectorReference {
    reference: VectorSearchReference,
}

impl StaticVectorReference {
    pub fn new(reference: VectorSearchReference) -> Self {
        Self { reference }
    }

    /// Load a reference from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let reference: VectorSearchReference = serde_json::from_str(json)?;
        Ok(Self::new(reference))
    }
}

#[async_trait]
impl VectorReferenceProvider for StaticVectorReference {
    async fn reference(&self, _query: &str) -> Result<VectorSearchReference> {
        Ok(self.reference.clone())
    }
}

/// Gathers collaborator context into an OrchestrationRequest.
///
/// Provider failures degrade to empty context; they never fail the request.
pub struct RequestAssembler {
    history: Arc<dyn ConversationHistoryProvider>,
    vectors: Arc<dyn VectorReferenceProvider>,
    history_turns: usize,
}

impl RequestAssembler {
    pub fn new(
        history: Arc<dyn ConversationHistoryProvider>,
        vectors: Arc<dyn VectorReferenceProvider>,
        history_turns: usize,
    ) -> Self {
        Self {
            history,
            vectors,
            history_turns,
        }
    }

    pub async fn assemble(
        &self,
        session_id: &str,
        query: &str,
        user_context: UserContext,
    ) -> OrchestrationRequest {
        let (history, reference) = tokio::join!(
            self.history.recent_turns(session_id, self.history_turns),
            self.vectors.reference(query),
        );

        let history = history.unwrap_or_else(|e| {
            degraded("conversation history", &e);
            Vec::new()
        });
        let reference = reference.unwrap_or_else(|e| {
            degraded("vector reference", &e);
            VectorSearchReference::empty()
        });

        OrchestrationRequest::new(session_id, query)
            .with_user_context(user_context)
            .with_history(history)
            .with_vector_reference(reference)
    }
}

fn degraded(what: &str, error: &AppError) {
    warn!(error = %error, code = ?error.code(), "{} unavailable, continuing without it", what);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingVectors;

    #[async_trait]
    impl VectorReferenceProvider for FailingVectors {
        async fn reference(&self, _query: &str) -> Result<VectorSearchReference> {
            Err(AppError::Internal {
                message: "index offline".into(),
            })
        }
    }

    fn chunk(id: &str, score: f32) -> ChunkContent {
        ChunkContent {
            chunk_id: id.into(),
            title: format!("title {}", id),
            content: format!("content {}", id),
            score: Some(score),
        }
    }

    #[test]
    fn test_confidence_cap() {
        assert_eq!(ConfidenceLevel::High.capped_at(ConfidenceLevel::Low), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::Low.capped_at(ConfidenceLevel::High), ConfidenceLevel::Low);
        assert_eq!(
            ConfidenceLevel::Medium.capped_at(ConfidenceLevel::Medium),
            ConfidenceLevel::Medium
        );
    }

    #[test]
    fn test_language_resolution() {
        let mut ctx = UserContext::default();
        assert_eq!(ctx.language_or("vi"), Language::Vi);
        assert_eq!(ctx.language_or("en"), Language::En);

        ctx.language = Some("en-US".into());
        assert_eq!(ctx.language_or("vi"), Language::En);
    }

    #[test]
    fn test_reference_top() {
        let reference = VectorSearchReference {
            max_score: 0.9,
            top_chunks: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            chunk_contents: vec![chunk("a", 0.9), chunk("b", 0.8), chunk("c", 0.7), chunk("d", 0.6)],
            search_time_ms: 12,
        };
        let top = reference.top(3);
        assert_eq!(top.len(), 3);
        assert_eq!(top[2].chunk_id, "c");
        assert!(!reference.is_empty());
        assert!(VectorSearchReference::empty().is_empty());
    }

    #[tokio::test]
    async fn test_history_keeps_last_turns() {
        let history = InMemoryHistory::new();
        for i in 0..5 {
            history.push("s1", ConversationTurn::user(format!("q{}", i))).await;
        }
        let turns = history.recent_turns("s1", 2).await.unwrap();
        assert_eq!(turns, vec![ConversationTurn::user("q3"), ConversationTurn::user("q4")]);
        assert!(history.recent_turns("nobody", 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assembler_degrades_on_provider_error() {
        let history = Arc::new(InMemoryHistory::new());
        history.push("s1", ConversationTurn::user("xin chào")).await;

        let assembler = RequestAssembler::new(history, Arc::new(FailingVectors), 6);
        let request = assembler.assemble("s1", "học phí", UserContext::default()).await;

        assert_eq!(request.history.len(), 1);
        assert!(request.vector_reference.is_empty());
        assert_eq!(request.query, "học phí");
    }

    #[test]
    fn test_static_reference_from_json() {
        let provider = StaticVectorReference::from_json(
            r#"{"max_score":0.5,"top_chunks":["x"],"chunk_contents":[],"search_time_ms":3}"#,
        )
        .unwrap();
        assert_eq!(provider.reference.max_score, 0.5);
    }
}
