pub mod chat_llm;
pub mod context;
pub mod firestore;
pub mod image_llm;
pub mod prompt_llm;
pub mod tts;
