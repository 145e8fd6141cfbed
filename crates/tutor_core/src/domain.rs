//! crates/tutor_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

/// Number of tokens a freshly registered student starts with.
pub const STARTING_TOKENS: i64 = 1000;

/// Maximum number of subjects a student may keep on their profile.
pub const MAX_SUBJECTS: usize = 5;

/// The fixed catalogue of subjects the platform can tutor.
pub const AVAILABLE_SUBJECTS: [&str; 11] = [
    "English A",
    "Mathematics",
    "Biology",
    "Integrated Science",
    "Agricultural Science",
    "Chemistry",
    "Human and Social Biology",
    "Physics",
    "Social Studies",
    "Principles of Business",
    "Geography",
];

/// Represents one stored student account, keyed by username.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    /// Abstract usage credits, unrelated to LLM tokenization.
    pub tokens: i64,
    pub preferences: LearningPreferences,
    pub subjects: Vec<String>,
    pub chat_history: Vec<ChatMessage>,
}

impl UserProfile {
    /// Builds the profile stored at registration time.
    pub fn new_registration(
        username: String,
        first_name: String,
        last_name: String,
        email: String,
        password_hash: String,
    ) -> Self {
        Self {
            username,
            first_name,
            last_name,
            email,
            password_hash,
            tokens: STARTING_TOKENS,
            preferences: LearningPreferences::default(),
            subjects: Vec::new(),
            chat_history: Vec::new(),
        }
    }
}

/// A partial update to a stored profile. Only the fields that are `Some`
/// are written; everything else is preserved (merge, not overwrite).
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub tokens: Option<i64>,
    pub preferences: Option<LearningPreferences>,
    pub subjects: Option<Vec<String>>,
    pub chat_history: Option<Vec<ChatMessage>>,
}

impl UserPatch {
    /// Applies the merge semantics to an in-memory profile. Stores must
    /// mirror exactly this behavior on their side.
    pub fn apply(&self, profile: &mut UserProfile) {
        if let Some(tokens) = self.tokens {
            profile.tokens = tokens;
        }
        if let Some(preferences) = self.preferences {
            profile.preferences = preferences;
        }
        if let Some(subjects) = &self.subjects {
            profile.subjects = subjects.clone();
        }
        if let Some(chat_history) = &self.chat_history {
            profile.chat_history = chat_history.clone();
        }
    }
}

/// A single role-tagged entry in the conversation transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }

    /// An `Image` message carries the generated image URL as its content.
    pub fn image(url: impl Into<String>) -> Self {
        Self { role: MessageRole::Image, content: url.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Image,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Image => "image",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "system" => Some(MessageRole::System),
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "image" => Some(MessageRole::Image),
            _ => None,
        }
    }
}

/// How the student prefers to be tutored. The enums replace free-form
/// strings so invalid values are rejected at the boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LearningPreferences {
    pub style: LearningStyle,
    pub pace: LearningPace,
    pub difficulty: DifficultyLevel,
}

impl LearningPreferences {
    /// Renders the preferences the way the system prompt expects them.
    pub fn describe(&self) -> String {
        format!(
            "style: {}, pace: {}, difficulty: {}",
            self.style.as_str(),
            self.pace.as_str(),
            self.difficulty.as_str()
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LearningStyle {
    #[default]
    Interactive,
    Visual,
    Auditory,
    ReadingWriting,
    Kinesthetic,
}

impl LearningStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningStyle::Interactive => "Interactive",
            LearningStyle::Visual => "Visual",
            LearningStyle::Auditory => "Auditory",
            LearningStyle::ReadingWriting => "Reading/Writing",
            LearningStyle::Kinesthetic => "Kinesthetic",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "interactive" => Some(LearningStyle::Interactive),
            "visual" => Some(LearningStyle::Visual),
            "auditory" => Some(LearningStyle::Auditory),
            "reading/writing" => Some(LearningStyle::ReadingWriting),
            "kinesthetic" => Some(LearningStyle::Kinesthetic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LearningPace {
    Slow,
    #[default]
    Moderate,
    Fast,
}

impl LearningPace {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningPace::Slow => "Slow",
            LearningPace::Moderate => "Moderate",
            LearningPace::Fast => "Fast",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "slow" => Some(LearningPace::Slow),
            "moderate" => Some(LearningPace::Moderate),
            "fast" => Some(LearningPace::Fast),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DifficultyLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Beginner => "Beginner",
            DifficultyLevel::Intermediate => "Intermediate",
            DifficultyLevel::Advanced => "Advanced",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "beginner" => Some(DifficultyLevel::Beginner),
            "intermediate" => Some(DifficultyLevel::Intermediate),
            "advanced" => Some(DifficultyLevel::Advanced),
            _ => None,
        }
    }
}

/// The grade level the student picks for a study session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GradeLevel {
    Elementary,
    MiddleSchool,
    #[default]
    HighSchool,
    College,
}

impl GradeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeLevel::Elementary => "Elementary",
            GradeLevel::MiddleSchool => "Middle School",
            GradeLevel::HighSchool => "High School",
            GradeLevel::College => "College",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "elementary" => Some(GradeLevel::Elementary),
            "middle school" => Some(GradeLevel::MiddleSchool),
            "high school" => Some(GradeLevel::HighSchool),
            "college" => Some(GradeLevel::College),
            _ => None,
        }
    }
}

/// The syllabus and supplementary notes loaded for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectContext {
    pub syllabus: String,
    pub notes: String,
}

/// Checks a proposed profile subject list against the catalogue and the
/// five-subject limit. Returns a human-readable rejection reason.
pub fn validate_subjects(subjects: &[String]) -> Result<(), String> {
    if subjects.len() > MAX_SUBJECTS {
        return Err(format!(
            "You can select a maximum of {} subjects.",
            MAX_SUBJECTS
        ));
    }
    for subject in subjects {
        if !AVAILABLE_SUBJECTS.contains(&subject.as_str()) {
            return Err(format!("Unknown subject: {}", subject));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile::new_registration(
            "alice".into(),
            "Alice".into(),
            "Smith".into(),
            "alice@example.com".into(),
            "$argon2id$fake".into(),
        )
    }

    #[test]
    fn registration_defaults() {
        let p = profile();
        assert_eq!(p.tokens, STARTING_TOKENS);
        assert_eq!(p.preferences, LearningPreferences::default());
        assert!(p.subjects.is_empty());
        assert!(p.chat_history.is_empty());
    }

    #[test]
    fn patch_merge_preserves_unspecified_fields() {
        let mut p = profile();
        p.subjects = vec!["Mathematics".into()];
        let patch = UserPatch { tokens: Some(999), ..Default::default() };
        patch.apply(&mut p);
        assert_eq!(p.tokens, 999);
        assert_eq!(p.subjects, vec!["Mathematics".to_string()]);
        assert_eq!(p.email, "alice@example.com");
    }

    #[test]
    fn subject_limit_enforced() {
        let six: Vec<String> = AVAILABLE_SUBJECTS[..6]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(validate_subjects(&six).is_err());
        assert!(validate_subjects(&six[..5]).is_ok());
    }

    #[test]
    fn unknown_subject_rejected() {
        let subjects = vec!["Alchemy".to_string()];
        assert!(validate_subjects(&subjects).is_err());
    }

    #[test]
    fn preference_names_round_trip() {
        for style in [
            LearningStyle::Interactive,
            LearningStyle::Visual,
            LearningStyle::Auditory,
            LearningStyle::ReadingWriting,
            LearningStyle::Kinesthetic,
        ] {
            assert_eq!(LearningStyle::from_name(style.as_str()), Some(style));
        }
        assert_eq!(LearningPace::from_name("moderate"), Some(LearningPace::Moderate));
        assert_eq!(DifficultyLevel::from_name("ADVANCED"), Some(DifficultyLevel::Advanced));
        assert_eq!(LearningStyle::from_name("telepathic"), None);
    }
}
