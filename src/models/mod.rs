// Domain models module
// Contains core data structures used throughout the crate

pub mod alignment;
pub mod content;
pub mod conversation;

// Экспортируем основные типы для удобства использования
pub use alignment::{DialogueAlignment, DialogueSegment, WordTiming};
pub use content::{Course, GrammarPoint, Lesson, VocabularyItem};
pub use conversation::{
    AlignmentMode, Conversation, ConversationParticipant, ConversationStatus, DialogueSentence,
    ParticipantRole,
};
