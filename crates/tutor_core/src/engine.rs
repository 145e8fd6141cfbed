//! crates/tutor_core/src/engine.rs
//!
//! The conversation engine: a per-session state machine that owns the
//! transcript invariants and the token accounting around the external
//! chat and image calls. All I/O goes through the ports, so the engine
//! is fully testable with in-memory implementations.

use std::sync::Arc;

use crate::domain::{
    ChatMessage, GradeLevel, MessageRole, SubjectContext, UserPatch, UserProfile,
};
use crate::ports::{
    ImageGenerationService, ImagePromptService, PortError, SubjectContextService,
    TutorChatService, UserStore,
};

/// Fixed token cost of one illustration request.
pub const ILLUSTRATION_COST: i64 = 50;

//=========================================================================================
// Session State
//=========================================================================================

/// The study-session state machine. `Loading` from the behavioral contract
/// is transient inside `start_session`, so only the two resting states are
/// represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudyState {
    NoSubject,
    Active { subject: String, grade: GradeLevel },
}

/// Per-browser-session conversation state: the active subject plus an
/// in-memory mirror of the persisted transcript.
#[derive(Debug, Clone)]
pub struct StudySession {
    pub username: String,
    pub state: StudyState,
    pub transcript: Vec<ChatMessage>,
}

impl StudySession {
    /// Creates a session for a freshly logged-in user. The stored transcript
    /// is mirrored for display, but no subject is active until the user
    /// starts a study session.
    pub fn new(username: String, stored_transcript: Vec<ChatMessage>) -> Self {
        Self {
            username,
            state: StudyState::NoSubject,
            transcript: stored_transcript,
        }
    }

    pub fn active_subject(&self) -> Option<&str> {
        match &self.state {
            StudyState::Active { subject, .. } => Some(subject),
            StudyState::NoSubject => None,
        }
    }
}

//=========================================================================================
// Engine Error
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No study subject is active. Select a subject first.")]
    NoActiveSubject,

    #[error("You have no tokens left! Please contact support for more.")]
    OutOfTokens,

    #[error("You need at least {needed} tokens to generate a visual. You have {have} tokens.")]
    InsufficientTokens { needed: i64, have: i64 },

    #[error("No recent tutor message to generate a visual from. Please ask a question first.")]
    NothingToIllustrate,

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Port(#[from] PortError),
}

pub type EngineResult<T> = Result<T, EngineError>;

//=========================================================================================
// The Engine
//=========================================================================================

/// Orchestrates one conversation turn at a time over the injected ports.
/// Constructed once at startup and shared across sessions; all mutable
/// state lives in the `StudySession` passed into each call.
pub struct ConversationEngine {
    store: Arc<dyn UserStore>,
    chat: Arc<dyn TutorChatService>,
    prompter: Arc<dyn ImagePromptService>,
    images: Arc<dyn ImageGenerationService>,
    context: Arc<dyn SubjectContextService>,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<dyn UserStore>,
        chat: Arc<dyn TutorChatService>,
        prompter: Arc<dyn ImagePromptService>,
        images: Arc<dyn ImageGenerationService>,
        context: Arc<dyn SubjectContextService>,
    ) -> Self {
        Self { store, chat, prompter, images, context }
    }

    /// Starts (or restarts) a study session for `subject`.
    ///
    /// Loads the subject context first; any load failure leaves the session
    /// untouched. On success the transcript is reset to exactly two entries,
    /// the system prompt and the tutor greeting, and persisted.
    pub async fn start_session(
        &self,
        session: &mut StudySession,
        subject: &str,
        grade: GradeLevel,
    ) -> EngineResult<()> {
        let profile = self.profile(&session.username).await?;
        let context = self.context.load(subject).await?;

        let transcript = vec![
            ChatMessage::system(build_system_prompt(subject, grade, &profile, &context)),
            ChatMessage::assistant(greeting(subject)),
        ];
        self.persist_transcript(&session.username, &transcript).await?;

        session.state = StudyState::Active {
            subject: subject.to_string(),
            grade,
        };
        session.transcript = transcript;
        Ok(())
    }

    /// One chat exchange: costs one token, persisted before the completion
    /// call and restored if that call fails. At most one chat-completion
    /// call per exchange.
    pub async fn send(&self, session: &mut StudySession, text: &str) -> EngineResult<String> {
        if session.active_subject().is_none() {
            return Err(EngineError::NoActiveSubject);
        }

        let profile = self.profile(&session.username).await?;
        if profile.tokens <= 0 {
            return Err(EngineError::OutOfTokens);
        }
        self.persist_tokens(&session.username, profile.tokens - 1).await?;

        session.transcript.push(ChatMessage::user(text));
        self.persist_transcript(&session.username, &session.transcript).await?;

        let outbound = api_transcript(&session.transcript);
        match self.chat.reply(&outbound).await {
            Ok(reply) => {
                session.transcript.push(ChatMessage::assistant(reply.clone()));
                self.persist_transcript(&session.username, &session.transcript).await?;
                Ok(reply)
            }
            Err(e) => {
                // Roll the speculative decrement back; the user message
                // stays in the transcript so the student can retry.
                self.refund(&session.username, profile.tokens).await;
                Err(e.into())
            }
        }
    }

    /// Clears the transcript and returns to `NoSubject`, whatever the
    /// transcript held before.
    pub async fn change_subject(&self, session: &mut StudySession) -> EngineResult<()> {
        self.persist_transcript(&session.username, &[]).await?;
        session.transcript.clear();
        session.state = StudyState::NoSubject;
        Ok(())
    }

    /// Generates a visual for the latest tutor reply. Costs
    /// `ILLUSTRATION_COST` tokens, deducted up front and refunded on any
    /// in-process failure. Two sequential external calls: a chat call that
    /// condenses the reply into a short prompt, then the image call.
    pub async fn illustrate(&self, session: &mut StudySession) -> EngineResult<String> {
        if session.active_subject().is_none() {
            return Err(EngineError::NoActiveSubject);
        }

        let profile = self.profile(&session.username).await?;
        if profile.tokens < ILLUSTRATION_COST {
            return Err(EngineError::InsufficientTokens {
                needed: ILLUSTRATION_COST,
                have: profile.tokens,
            });
        }
        self.persist_tokens(&session.username, profile.tokens - ILLUSTRATION_COST)
            .await?;

        let Some(source) = last_assistant_message(&session.transcript) else {
            self.refund(&session.username, profile.tokens).await;
            return Err(EngineError::NothingToIllustrate);
        };

        let prompt = match self.prompter.condense(&source).await {
            Ok(prompt) => prompt,
            Err(e) => {
                self.refund(&session.username, profile.tokens).await;
                return Err(e.into());
            }
        };

        let url = match self.images.generate(&prompt).await {
            Ok(url) => url,
            Err(e) => {
                self.refund(&session.username, profile.tokens).await;
                return Err(e.into());
            }
        };

        session
            .transcript
            .push(ChatMessage::assistant(format!("Generating a visual for: '{}'", prompt)));
        session.transcript.push(ChatMessage::image(url.clone()));
        self.persist_transcript(&session.username, &session.transcript).await?;
        Ok(url)
    }

    // --- Helpers ---

    async fn profile(&self, username: &str) -> EngineResult<UserProfile> {
        self.store
            .get(username)
            .await?
            .ok_or_else(|| EngineError::UnknownUser(username.to_string()))
    }

    async fn persist_tokens(&self, username: &str, tokens: i64) -> EngineResult<()> {
        let patch = UserPatch { tokens: Some(tokens), ..Default::default() };
        self.store.update(username, &patch).await?;
        Ok(())
    }

    async fn persist_transcript(
        &self,
        username: &str,
        transcript: &[ChatMessage],
    ) -> EngineResult<()> {
        let patch = UserPatch {
            chat_history: Some(transcript.to_vec()),
            ..Default::default()
        };
        self.store.update(username, &patch).await?;
        Ok(())
    }

    /// Restores the balance after a failed external call. Best-effort: if
    /// the write itself fails the original error still reaches the user.
    async fn refund(&self, username: &str, tokens: i64) {
        let patch = UserPatch { tokens: Some(tokens), ..Default::default() };
        let _ = self.store.update(username, &patch).await;
    }
}

//=========================================================================================
// Prompt Construction
//=========================================================================================

/// Builds the system prompt that seeds every study session. The LaTeX
/// instructions keep equations renderable on the client.
fn build_system_prompt(
    subject: &str,
    grade: GradeLevel,
    profile: &UserProfile,
    context: &SubjectContext,
) -> String {
    format!(
        r#"You are an AI tutor specializing in {subject}.
Your responses should be tailored to the student's preferences and selected subject.
Student's Grade Level: {grade}
Student's Preferences: {preferences}

**IMPORTANT INSTRUCTION FOR EQUATIONS:**
Whenever you present a chemical equation, mathematical formula, or any scientific notation, please format it using LaTeX.
Use `$$...$$` for block equations (on their own line) and `$...$` for inline equations within text.
For chemical symbols within LaTeX, use `\text{{Symbol}}` to ensure they are rendered as plain text (e.g., `$\text{{H}}_2\text{{O}}$` for H2O).
---
Syllabus for {subject}:
{syllabus}
---
Additional Context for {subject}:
{notes}
---
Be helpful, patient, and provide clear explanations. Ensure your answers are strictly within the scope of the provided syllabus and context."#,
        subject = subject,
        grade = grade.as_str(),
        preferences = profile.preferences.describe(),
        syllabus = context.syllabus,
        notes = context.notes,
    )
}

fn greeting(subject: &str) -> String {
    format!(
        "Hello! Welcome to your {} study session. I'm ready to help you with any \
         questions you have based on the syllabus and context provided. How can I \
         assist you today?",
        subject
    )
}

/// The transcript as sent to the chat-completion API: insertion order,
/// image entries excluded (the chat API has no such role).
fn api_transcript(transcript: &[ChatMessage]) -> Vec<ChatMessage> {
    transcript
        .iter()
        .filter(|m| m.role != MessageRole::Image)
        .cloned()
        .collect()
}

fn last_assistant_message(transcript: &[ChatMessage]) -> Option<String> {
    transcript
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant)
        .map(|m| m.content.clone())
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{PortResult, SubjectContextService};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        users: Mutex<HashMap<String, UserProfile>>,
    }

    impl MemoryStore {
        fn with_user(profile: UserProfile) -> Arc<Self> {
            let store = Self::default();
            store
                .users
                .lock()
                .unwrap()
                .insert(profile.username.clone(), profile);
            Arc::new(store)
        }

        fn profile(&self, username: &str) -> UserProfile {
            self.users.lock().unwrap().get(username).unwrap().clone()
        }
    }

    #[async_trait]
    impl UserStore for MemoryStore {
        async fn get(&self, username: &str) -> PortResult<Option<UserProfile>> {
            Ok(self.users.lock().unwrap().get(username).cloned())
        }

        async fn create(&self, profile: &UserProfile) -> PortResult<()> {
            let mut users = self.users.lock().unwrap();
            if users.contains_key(&profile.username) {
                return Err(PortError::AlreadyExists(profile.username.clone()));
            }
            users.insert(profile.username.clone(), profile.clone());
            Ok(())
        }

        async fn update(&self, username: &str, patch: &UserPatch) -> PortResult<()> {
            let mut users = self.users.lock().unwrap();
            let profile = users
                .get_mut(username)
                .ok_or_else(|| PortError::NotFound(username.to_string()))?;
            patch.apply(profile);
            Ok(())
        }
    }

    struct ScriptedChat {
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl TutorChatService for ScriptedChat {
        async fn reply(&self, _transcript: &[ChatMessage]) -> PortResult<String> {
            self.reply
                .map(str::to_string)
                .ok_or_else(|| PortError::Unexpected("chat API down".into()))
        }
    }

    struct ScriptedPrompter {
        prompt: Option<&'static str>,
    }

    #[async_trait]
    impl ImagePromptService for ScriptedPrompter {
        async fn condense(&self, _source_text: &str) -> PortResult<String> {
            self.prompt
                .map(str::to_string)
                .ok_or_else(|| PortError::Unexpected("prompt API down".into()))
        }
    }

    struct ScriptedImages {
        url: Option<&'static str>,
    }

    #[async_trait]
    impl ImageGenerationService for ScriptedImages {
        async fn generate(&self, _prompt: &str) -> PortResult<String> {
            self.url
                .map(str::to_string)
                .ok_or_else(|| PortError::Unexpected("image API down".into()))
        }
    }

    #[derive(Default)]
    struct StaticContext {
        known: HashMap<String, SubjectContext>,
    }

    impl StaticContext {
        fn with_subject(subject: &str) -> Self {
            let mut known = HashMap::new();
            known.insert(
                subject.to_string(),
                SubjectContext {
                    syllabus: format!("{} syllabus", subject),
                    notes: format!("{} notes", subject),
                },
            );
            Self { known }
        }
    }

    #[async_trait]
    impl SubjectContextService for StaticContext {
        async fn load(&self, subject: &str) -> PortResult<SubjectContext> {
            self.known
                .get(subject)
                .cloned()
                .ok_or_else(|| PortError::NotFound(format!("no files for {}", subject)))
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        engine: ConversationEngine,
    }

    fn harness(
        tokens: i64,
        chat: ScriptedChat,
        prompter: ScriptedPrompter,
        images: ScriptedImages,
        context: StaticContext,
    ) -> Harness {
        let mut profile = UserProfile::new_registration(
            "alice".into(),
            "Alice".into(),
            "Smith".into(),
            "alice@example.com".into(),
            "hash".into(),
        );
        profile.tokens = tokens;
        let store = MemoryStore::with_user(profile);
        let engine = ConversationEngine::new(
            store.clone(),
            Arc::new(chat),
            Arc::new(prompter),
            Arc::new(images),
            Arc::new(context),
        );
        Harness { store, engine }
    }

    fn working_harness(tokens: i64) -> Harness {
        harness(
            tokens,
            ScriptedChat { reply: Some("2+2 is 4.") },
            ScriptedPrompter { prompt: Some("a diagram of addition") },
            ScriptedImages { url: Some("https://img.example/1.png") },
            StaticContext::with_subject("Mathematics"),
        )
    }

    async fn active_session(h: &Harness) -> StudySession {
        let mut session = StudySession::new("alice".into(), Vec::new());
        h.engine
            .start_session(&mut session, "Mathematics", GradeLevel::HighSchool)
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn start_session_seeds_system_and_greeting() {
        let h = working_harness(100);
        let session = active_session(&h).await;

        assert_eq!(session.transcript.len(), 2);
        assert_eq!(session.transcript[0].role, MessageRole::System);
        assert!(session.transcript[0].content.contains("Mathematics syllabus"));
        assert!(session.transcript[0].content.contains("High School"));
        assert_eq!(session.transcript[1].role, MessageRole::Assistant);
        assert_eq!(session.active_subject(), Some("Mathematics"));
        // Persisted too.
        assert_eq!(h.store.profile("alice").chat_history.len(), 2);
    }

    #[tokio::test]
    async fn start_session_missing_context_changes_nothing() {
        let h = working_harness(100);
        let mut session = StudySession::new("alice".into(), vec![ChatMessage::user("old")]);

        let result = h
            .engine
            .start_session(&mut session, "Geography", GradeLevel::College)
            .await;

        assert!(matches!(result, Err(EngineError::Port(PortError::NotFound(_)))));
        assert_eq!(session.state, StudyState::NoSubject);
        assert_eq!(session.transcript.len(), 1);
        assert!(h.store.profile("alice").chat_history.is_empty());
    }

    #[tokio::test]
    async fn send_costs_one_token_and_appends_two_messages() {
        let h = working_harness(1);
        let mut session = active_session(&h).await;

        let reply = h.engine.send(&mut session, "What is 2+2?").await.unwrap();

        assert_eq!(reply, "2+2 is 4.");
        assert_eq!(session.transcript.len(), 4);
        assert_eq!(session.transcript[2], ChatMessage::user("What is 2+2?"));
        assert_eq!(session.transcript[3], ChatMessage::assistant("2+2 is 4."));
        assert_eq!(h.store.profile("alice").tokens, 0);
        assert_eq!(h.store.profile("alice").chat_history.len(), 4);
    }

    #[tokio::test]
    async fn send_rolls_back_token_on_chat_failure() {
        let h = harness(
            10,
            ScriptedChat { reply: None },
            ScriptedPrompter { prompt: Some("unused") },
            ScriptedImages { url: Some("unused") },
            StaticContext::with_subject("Mathematics"),
        );
        let mut session = active_session(&h).await;

        let result = h.engine.send(&mut session, "hello?").await;

        assert!(matches!(result, Err(EngineError::Port(_))));
        // Net effect of decrement + rollback is zero.
        assert_eq!(h.store.profile("alice").tokens, 10);
        // The user message stays so the student can re-trigger the turn.
        assert_eq!(session.transcript.last().unwrap().role, MessageRole::User);
    }

    #[tokio::test]
    async fn send_without_tokens_is_rejected() {
        let h = working_harness(0);
        let mut session = active_session(&h).await;
        let before = session.transcript.len();

        let result = h.engine.send(&mut session, "hello?").await;

        assert!(matches!(result, Err(EngineError::OutOfTokens)));
        assert_eq!(session.transcript.len(), before);
    }

    #[tokio::test]
    async fn send_without_subject_is_rejected() {
        let h = working_harness(10);
        let mut session = StudySession::new("alice".into(), Vec::new());

        let result = h.engine.send(&mut session, "hello?").await;
        assert!(matches!(result, Err(EngineError::NoActiveSubject)));
    }

    #[tokio::test]
    async fn change_subject_empties_any_transcript() {
        let h = working_harness(100);
        let mut session = active_session(&h).await;
        h.engine.send(&mut session, "What is 2+2?").await.unwrap();
        assert_eq!(session.transcript.len(), 4);

        h.engine.change_subject(&mut session).await.unwrap();

        assert!(session.transcript.is_empty());
        assert_eq!(session.state, StudyState::NoSubject);
        assert!(h.store.profile("alice").chat_history.is_empty());
    }

    #[tokio::test]
    async fn illustrate_deducts_fixed_cost_and_appends_image() {
        let h = working_harness(100);
        let mut session = active_session(&h).await;

        let url = h.engine.illustrate(&mut session).await.unwrap();

        assert_eq!(url, "https://img.example/1.png");
        assert_eq!(h.store.profile("alice").tokens, 100 - ILLUSTRATION_COST);
        let last = session.transcript.last().unwrap();
        assert_eq!(last.role, MessageRole::Image);
        assert_eq!(last.content, "https://img.example/1.png");
    }

    #[tokio::test]
    async fn illustrate_refunds_on_image_failure() {
        let h = harness(
            80,
            ScriptedChat { reply: Some("ok") },
            ScriptedPrompter { prompt: Some("a diagram") },
            ScriptedImages { url: None },
            StaticContext::with_subject("Mathematics"),
        );
        let mut session = active_session(&h).await;

        let result = h.engine.illustrate(&mut session).await;

        assert!(matches!(result, Err(EngineError::Port(_))));
        assert_eq!(h.store.profile("alice").tokens, 80);
    }

    #[tokio::test]
    async fn illustrate_refunds_on_prompt_failure() {
        let h = harness(
            80,
            ScriptedChat { reply: Some("ok") },
            ScriptedPrompter { prompt: None },
            ScriptedImages { url: Some("https://img.example/1.png") },
            StaticContext::with_subject("Mathematics"),
        );
        let mut session = active_session(&h).await;

        let result = h.engine.illustrate(&mut session).await;

        assert!(matches!(result, Err(EngineError::Port(_))));
        assert_eq!(h.store.profile("alice").tokens, 80);
    }

    #[tokio::test]
    async fn illustrate_below_cost_is_rejected_without_deduction() {
        let h = working_harness(ILLUSTRATION_COST - 1);
        let mut session = active_session(&h).await;

        let result = h.engine.illustrate(&mut session).await;

        assert!(matches!(
            result,
            Err(EngineError::InsufficientTokens { needed: ILLUSTRATION_COST, .. })
        ));
        assert_eq!(h.store.profile("alice").tokens, ILLUSTRATION_COST - 1);
    }

    #[tokio::test]
    async fn illustrate_with_no_assistant_reply_refunds() {
        let h = working_harness(100);
        let mut session = active_session(&h).await;
        // Strip the greeting so no assistant message exists.
        session.transcript.retain(|m| m.role != MessageRole::Assistant);

        let result = h.engine.illustrate(&mut session).await;

        assert!(matches!(result, Err(EngineError::NothingToIllustrate)));
        assert_eq!(h.store.profile("alice").tokens, 100);
    }

    #[tokio::test]
    async fn duplicate_create_leaves_existing_record_alone() {
        let h = working_harness(42);
        let impostor = UserProfile::new_registration(
            "alice".into(),
            "Mallory".into(),
            "Jones".into(),
            "mallory@example.com".into(),
            "other-hash".into(),
        );

        let result = h.store.create(&impostor).await;

        assert!(matches!(result, Err(PortError::AlreadyExists(_))));
        assert_eq!(h.store.profile("alice").first_name, "Alice");
        assert_eq!(h.store.profile("alice").tokens, 42);
    }
}
