pub mod domain;
pub mod engine;
pub mod page;
pub mod ports;

pub use domain::{
    ChatMessage, DifficultyLevel, GradeLevel, LearningPace, LearningPreferences,
    LearningStyle, MessageRole, SubjectContext, UserPatch, UserProfile,
    AVAILABLE_SUBJECTS, MAX_SUBJECTS, STARTING_TOKENS,
};
pub use engine::{
    ConversationEngine, EngineError, EngineResult, StudySession, StudyState,
    ILLUSTRATION_COST,
};
pub use page::{Page, PageEvent};
pub use ports::{
    ImageGenerationService, ImagePromptService, PortError, PortResult,
    SubjectContextService, TextToSpeechService, TutorChatService, UserStore,
};
