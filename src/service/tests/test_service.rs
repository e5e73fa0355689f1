use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;

use crate::error::{Result, StudioError};
use crate::models::{
    AlignmentMode, Conversation, ConversationParticipant, ConversationStatus, DialogueSentence,
    ParticipantRole,
};
use crate::service::ConversationService;
use crate::storage::{LocalObjectStorage, ObjectStorage};
use crate::store::{ConversationStore, MemoryStore};
use crate::timing::CharacterAlignment;
use crate::tts::{DialogueInput, DialogueSynthesizer, SpeechBackend, TimestampedSpeech, VoiceSegment};

#[derive(Clone, Copy, PartialEq)]
enum Backend {
    Timestamped,
    PlainOnly,
    Down,
}

/// Каждая реплика звучит одну секунду, слово на реплику
struct ScriptedBackend {
    mode: Backend,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(mode: Backend) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SpeechBackend for ScriptedBackend {
    async fn synthesize_timestamped(&self, inputs: &[DialogueInput]) -> Result<TimestampedSpeech> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.mode != Backend::Timestamped {
            return Err(StudioError::Synthesis("timestamps unavailable".to_string()));
        }

        let mut alignment = CharacterAlignment::default();
        let mut voice_segments = Vec::new();
        for (i, input) in inputs.iter().enumerate() {
            let start = i as f64;
            alignment.characters.push("w".to_string());
            alignment.character_start_times_seconds.push(start);
            alignment.character_end_times_seconds.push(start + 1.0);
            voice_segments.push(VoiceSegment {
                voice_id: input.voice_id.clone(),
                start_time_seconds: start,
                end_time_seconds: start + 1.0,
                character_start_index: i,
                character_end_index: i + 1,
                dialogue_input_index: Some(i),
            });
        }

        Ok(TimestampedSpeech {
            audio_base64: general_purpose::STANDARD.encode(b"mp3"),
            alignment: Some(alignment),
            normalized_alignment: None,
            voice_segments,
        })
    }

    async fn synthesize(&self, _inputs: &[DialogueInput]) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Backend::Down => Err(StudioError::Synthesis("503 Service Unavailable".to_string())),
            _ => Ok(Bytes::from_static(b"plain-mp3")),
        }
    }
}

/// Запрос к сервису синтеза, который никогда не завершается
struct HangingBackend;

#[async_trait]
impl SpeechBackend for HangingBackend {
    async fn synthesize_timestamped(&self, _inputs: &[DialogueInput]) -> Result<TimestampedSpeech> {
        std::future::pending().await
    }

    async fn synthesize(&self, _inputs: &[DialogueInput]) -> Result<Bytes> {
        std::future::pending().await
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<MemoryStore>,
    storage: Arc<LocalObjectStorage>,
}

fn conversation() -> Conversation {
    let mut conversation = Conversation::new("c1", "Greetings");
    conversation.participants = vec![
        ConversationParticipant {
            role: ParticipantRole::A,
            name: "Yui".to_string(),
            voice_id: "voice-a".to_string(),
        },
        ConversationParticipant {
            role: ParticipantRole::B,
            name: "Ken".to_string(),
            voice_id: "voice-b".to_string(),
        },
    ];
    conversation.sentences = vec![
        DialogueSentence {
            id: "s1".to_string(),
            role: ParticipantRole::A,
            text: "こんにちは".to_string(),
            tone: None,
            emotion: None,
            order: 0,
        },
        DialogueSentence {
            id: "s2".to_string(),
            role: ParticipantRole::B,
            text: "やあ".to_string(),
            tone: Some("friendly".to_string()),
            emotion: None,
            order: 1,
        },
    ];
    conversation
}

async fn fixture(conversation: Conversation) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalObjectStorage::new(dir.path()));
    let store = Arc::new(MemoryStore::new());
    store.insert_conversation(conversation).await;
    Fixture {
        _dir: dir,
        store,
        storage,
    }
}

impl Fixture {
    fn service(&self, backend: Arc<ScriptedBackend>) -> ConversationService {
        ConversationService::new(self.store.clone(), self.storage.clone())
            .with_synthesizer(DialogueSynthesizer::new(backend))
    }

    async fn stored(&self) -> Conversation {
        self.store.find_conversation("c1").await.unwrap().unwrap()
    }

    /// Дождаться статуса, выставленного фоновой задачей
    async fn wait_for_status(&self, status: ConversationStatus) -> Conversation {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let stored = self.stored().await;
                if stored.status == status {
                    return stored;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap()
    }

    fn object_exists(&self, key: &str) -> bool {
        self.storage.path_for(key).unwrap().exists()
    }
}

#[tokio::test]
async fn test_generate_audio_completes_with_timing() {
    let fx = fixture(conversation()).await;

    let updated = fx.service(ScriptedBackend::new(Backend::Timestamped)).generate_audio("c1").await.unwrap();

    assert_eq!(updated.status, ConversationStatus::Completed);
    assert_eq!(updated.alignment_mode, Some(AlignmentMode::Timestamped));
    assert_eq!(updated.audio_duration, Some(2.0));
    assert!(updated.error.is_none());

    let key = updated.audio_key.clone().unwrap();
    assert!(key.starts_with("conversations/audio/c1/"));
    assert!(fx.object_exists(&key));

    let alignment = updated.alignment.unwrap();
    assert_eq!(alignment.segments.len(), 2);
    assert_eq!(alignment.segments[1].sentence_id, "s2");
    assert_eq!(alignment.segments[1].start_time, 1.0);
    assert_eq!(fx.stored().await.status, ConversationStatus::Completed);
}

#[tokio::test]
async fn test_degraded_generation_still_completes() {
    let fx = fixture(conversation()).await;

    let updated = fx.service(ScriptedBackend::new(Backend::PlainOnly)).generate_audio("c1").await.unwrap();

    assert_eq!(updated.status, ConversationStatus::Completed);
    assert_eq!(updated.alignment_mode, Some(AlignmentMode::Degraded));
    assert_eq!(updated.audio_duration, None);
    let alignment = updated.alignment.unwrap();
    assert_eq!(alignment.total_duration, 0.0);
    assert!(alignment.segments.iter().all(|s| s.words.is_empty()));
}

#[tokio::test]
async fn test_failure_marks_conversation_failed_and_keeps_artifacts() {
    let mut existing = conversation();
    existing.status = ConversationStatus::Completed;
    existing.audio_key = Some("conversations/audio/c1/old.mp3".to_string());
    let fx = fixture(existing).await;

    let err = fx.service(ScriptedBackend::new(Backend::Down)).generate_audio("c1").await.unwrap_err();
    assert!(matches!(err, StudioError::Synthesis(_)));

    let stored = fx.stored().await;
    assert_eq!(stored.status, ConversationStatus::Failed);
    assert!(stored.error.unwrap().contains("503"));
    assert_eq!(stored.audio_key.as_deref(), Some("conversations/audio/c1/old.mp3"));
}

#[tokio::test]
async fn test_precondition_failure_leaves_status() {
    let mut conversation = conversation();
    conversation.participants[1].voice_id = String::new();
    let fx = fixture(conversation).await;
    let backend = ScriptedBackend::new(Backend::Timestamped);

    let err = fx.service(backend.clone()).generate_audio("c1").await.unwrap_err();

    assert!(matches!(err, StudioError::Precondition(_)));
    assert!(err.is_client_error());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.stored().await.status, ConversationStatus::Draft);
}

#[tokio::test]
async fn test_generation_in_progress_is_conflict() {
    let mut conversation = conversation();
    conversation.status = ConversationStatus::Generating;
    let fx = fixture(conversation).await;
    let backend = ScriptedBackend::new(Backend::Timestamped);

    let err = fx.service(backend.clone()).generate_audio("c1").await.unwrap_err();

    assert!(matches!(err, StudioError::Conflict(_)));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_generation_can_be_retried() {
    let fx = fixture(conversation()).await;
    let hanging = Arc::new(
        ConversationService::new(fx.store.clone(), fx.storage.clone())
            .with_synthesizer(DialogueSynthesizer::new(Arc::new(HangingBackend))),
    );

    let task = {
        let service = hanging.clone();
        tokio::spawn(async move { service.generate_audio("c1").await })
    };
    fx.wait_for_status(ConversationStatus::Generating).await;

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    let released = fx.wait_for_status(ConversationStatus::Failed).await;
    assert_eq!(released.error.as_deref(), Some("generation interrupted"));

    let updated = fx.service(ScriptedBackend::new(Backend::Timestamped)).generate_audio("c1").await.unwrap();
    assert_eq!(updated.status, ConversationStatus::Completed);
    assert!(updated.error.is_none());
}

#[tokio::test]
async fn test_forced_generation_recovers_stuck_conversation() {
    let mut conversation = conversation();
    conversation.status = ConversationStatus::Generating;
    let fx = fixture(conversation).await;
    let service = fx.service(ScriptedBackend::new(Backend::Timestamped));

    assert!(matches!(service.generate_audio("c1").await, Err(StudioError::Conflict(_))));

    let updated = service.force_generate_audio("c1").await.unwrap();
    assert_eq!(updated.status, ConversationStatus::Completed);
    assert!(updated.audio_key.is_some());
}

#[tokio::test]
async fn test_regeneration_replaces_previous_audio() {
    let fx = fixture(conversation()).await;
    let old_key = "conversations/audio/c1/old.mp3";
    fx.storage
        .upload(old_key, Bytes::from_static(b"old"), "audio/mpeg")
        .await
        .unwrap();

    let mut stored = fx.stored().await;
    stored.audio_key = Some(old_key.to_string());
    fx.store.insert_conversation(stored).await;

    let updated = fx.service(ScriptedBackend::new(Backend::Timestamped)).generate_audio("c1").await.unwrap();

    assert_ne!(updated.audio_key.as_deref(), Some(old_key));
    assert!(!fx.object_exists(old_key));
}

#[tokio::test]
async fn test_compose_without_renderer_is_configuration_error() {
    let fx = fixture(conversation()).await;
    let service = fx.service(ScriptedBackend::new(Backend::Timestamped));
    let request = crate::media::CompositionRequest::new(
        "c1",
        Bytes::from_static(b"png"),
        &crate::config::RenderConfig::default(),
    );

    let err = service.compose_video(request).await.unwrap_err();
    assert!(matches!(err, StudioError::Configuration(_)));
}

#[tokio::test]
async fn test_generate_without_synthesizer_is_configuration_error() {
    let fx = fixture(conversation()).await;
    let service = ConversationService::new(fx.store.clone(), fx.storage.clone());

    let err = service.generate_audio("c1").await.unwrap_err();
    assert!(matches!(err, StudioError::Configuration(_)));
    assert_eq!(fx.stored().await.status, ConversationStatus::Draft);
}

#[tokio::test]
async fn test_unknown_conversation_is_not_found() {
    let fx = fixture(conversation()).await;
    let err = fx
        .service(ScriptedBackend::new(Backend::Timestamped))
        .generate_audio("nope")
        .await
        .unwrap_err();
    assert!(matches!(err, StudioError::NotFound(_)));
}
