pub mod config;
pub mod history;
pub mod normalizer;
pub mod providers;
pub mod reconcile;
pub mod requester;
pub mod store;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use breedscan_contracts::breeds::{Breed, BreedCatalog, BreedType};
use breedscan_contracts::events::{EventLog, RecognitionEvent};
use breedscan_contracts::recognition::{HistoryRecord, RecognitionResult};
use breedscan_contracts::RecognitionError;
use tracing::{info, warn};

pub use config::{EngineConfig, HistoryPolicy, StoreConfig};
pub use history::HistoryRecorder;
pub use normalizer::ImagePayload;
pub use providers::{
    default_provider_registry, DryrunProvider, GeminiProvider, VisionProvider,
    VisionProviderRegistry,
};
pub use reconcile::{FixedJitter, RandomJitter, ScoreJitter};
pub use store::{BreedQuery, BreedStore, MemoryStore, RestStore};

/// Runs recognitions against one store and one vision provider.
///
/// One request at a time: `identify` takes `&mut self`, and each call reads a
/// fresh catalog snapshot from the store. The event log is telemetry only; a
/// failed append is logged and never changes the outcome of a call.
pub struct BreedRecognizer {
    store: Arc<dyn BreedStore>,
    provider: Box<dyn VisionProvider>,
    model: String,
    jitter: Box<dyn ScoreJitter>,
    history: HistoryRecorder,
    history_policy: HistoryPolicy,
    events: Option<EventLog>,
}

impl BreedRecognizer {
    pub fn new(
        store: Arc<dyn BreedStore>,
        provider: Box<dyn VisionProvider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            history: HistoryRecorder::new(store.clone()),
            store,
            provider,
            model: model.into(),
            jitter: Box::new(RandomJitter::new()),
            history_policy: HistoryPolicy::default(),
            events: None,
        }
    }

    /// Gemini-backed recognizer configured from `config`.
    pub fn from_config(config: &EngineConfig, store: Arc<dyn BreedStore>) -> Self {
        Self::new(store, Box::new(GeminiProvider::new(config)), config.model.clone())
            .with_history_policy(config.history_policy)
    }

    pub fn with_jitter(mut self, jitter: Box<dyn ScoreJitter>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_history_policy(mut self, policy: HistoryPolicy) -> Self {
        self.history_policy = policy;
        self
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.history = self.history.with_user(user_id);
        self
    }

    /// Starts the session in `events`. An unwritable log is reported here,
    /// before any recognition runs.
    pub fn with_events(mut self, events: EventLog) -> Result<Self> {
        events.append(&RecognitionEvent::SessionStarted {
            provider: self.provider.name().to_string(),
            model: self.model.clone(),
            store: self.store.name().to_string(),
        })?;
        self.events = Some(events);
        Ok(self)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Breeds sorted by name, optionally of one type.
    pub fn list_breeds(&self, breed_type: Option<BreedType>) -> Result<Vec<Breed>, RecognitionError> {
        self.store.fetch_breeds(BreedQuery::listing(breed_type))
    }

    pub fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        self.store.recent_history(limit)
    }

    /// Normalizes the image at `path`, then identifies it.
    pub fn identify_file(&mut self, path: &Path) -> Result<RecognitionResult, RecognitionError> {
        let bytes = normalizer::read_file(path)?;
        self.identify_bytes(&bytes, &path.to_string_lossy())
    }

    /// Decodes a `data:image/...;base64,` URL, normalizes it, then identifies it.
    pub fn identify_data_url(&mut self, url: &str) -> Result<RecognitionResult, RecognitionError> {
        let bytes = normalizer::decode_data_url(url)?;
        self.identify_bytes(&bytes, "data-url")
    }

    /// Normalizes encoded image `bytes`, then identifies them. `source` only
    /// labels the `image_normalized` event.
    pub fn identify_bytes(
        &mut self,
        bytes: &[u8],
        source: &str,
    ) -> Result<RecognitionResult, RecognitionError> {
        self.provider.ensure_configured()?;
        let image = normalizer::normalize(bytes)?;
        self.emit(RecognitionEvent::ImageNormalized {
            source: source.to_string(),
            width: image.width,
            height: image.height,
            encoded_chars: image.data.len(),
        });
        self.identify(&image)
    }

    /// Identifies an already normalized image.
    pub fn identify(&mut self, image: &ImagePayload) -> Result<RecognitionResult, RecognitionError> {
        let outcome = self.run_identify(image);
        if let Err(err) = &outcome {
            warn!(kind = err.kind().as_str(), error = %err, "recognition failed");
            self.emit(RecognitionEvent::failed(err));
        }
        outcome
    }

    fn run_identify(&mut self, image: &ImagePayload) -> Result<RecognitionResult, RecognitionError> {
        self.provider.ensure_configured()?;

        let catalog = BreedCatalog::new(self.store.fetch_breeds(BreedQuery::all())?);
        let duplicates = catalog.duplicate_names();
        if !duplicates.is_empty() {
            warn!(?duplicates, "duplicate breed names in catalog; first match wins");
        }
        self.emit(RecognitionEvent::CatalogLoaded {
            store: self.store.name().to_string(),
            count: catalog.len(),
            duplicates,
        });

        let (guess, reply) =
            requester::request_guess(self.provider.as_ref(), &self.model, image, &catalog)?;
        self.emit(RecognitionEvent::ai_guess(
            self.provider.name(),
            &guess,
            reply.provider_request,
            reply.provider_response,
        ));

        let result = reconcile::reconcile(&guess, &catalog, self.jitter.as_mut())?;
        info!(
            breed = %result.breed.name,
            confidence = result.confidence,
            matched_by = result.matched_by.as_str(),
            alternatives = result.alternatives.len(),
            "breed identified"
        );
        self.emit(RecognitionEvent::matched(&result));

        self.record_history(&result, image)?;
        Ok(result)
    }

    fn record_history(
        &self,
        result: &RecognitionResult,
        image: &ImagePayload,
    ) -> Result<(), RecognitionError> {
        let err = match self.history.record_result(result, image, &self.model) {
            Ok(record) => {
                self.emit(RecognitionEvent::history_recorded(&record));
                return Ok(());
            }
            Err(err) => err,
        };
        let message = format!("Failed to record recognition history: {err:#}");
        self.emit(RecognitionEvent::HistoryWriteFailed {
            message: message.clone(),
            policy: self.history_policy.as_str().to_string(),
        });
        match self.history_policy {
            HistoryPolicy::BestEffort => {
                warn!(error = %message, "history write failed; keeping result");
                Ok(())
            }
            HistoryPolicy::Required => Err(RecognitionError::UnknownFailure(message)),
        }
    }

    fn emit(&self, event: RecognitionEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(err) = events.append(&event) {
            warn!(event = event.name(), error = %format!("{err:#}"), "failed to append event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::bail;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use breedscan_contracts::breeds::{Breed, BreedType, PrimaryUse};
    use breedscan_contracts::error::RecognitionErrorKind;
    use breedscan_contracts::events::EventLog;
    use breedscan_contracts::recognition::{HistoryRecord, MatchKind};
    use breedscan_contracts::RecognitionError;
    use image::{DynamicImage, ImageFormat};
    use serde_json::Value;

    use super::{
        BreedQuery, BreedRecognizer, BreedStore, DryrunProvider, EngineConfig, FixedJitter,
        HistoryPolicy, ImagePayload, MemoryStore, VisionProvider,
    };
    use crate::providers::{VisionReply, VisionRequest};

    fn breeds() -> Vec<Breed> {
        vec![
            Breed::new("gir", "Gir", BreedType::Cattle)
                .with_origin("Gujarat")
                .with_primary_use(PrimaryUse::Dairy),
            Breed::new("sahiwal", "Sahiwal", BreedType::Cattle)
                .with_origin("Punjab")
                .with_primary_use(PrimaryUse::Dairy),
            Breed::new("red-sindhi", "Red Sindhi", BreedType::Cattle)
                .with_origin("Sindh")
                .with_primary_use(PrimaryUse::Dairy),
            Breed::new("murrah", "Murrah", BreedType::Buffalo)
                .with_origin("Haryana")
                .with_primary_use(PrimaryUse::Dairy),
            Breed::new("ongole", "Ongole", BreedType::Cattle)
                .with_origin("Andhra Pradesh")
                .with_primary_use(PrimaryUse::Draft),
        ]
    }

    fn image() -> ImagePayload {
        ImagePayload {
            mime_type: "image/jpeg".to_string(),
            data: "C".repeat(300),
            width: 800,
            height: 600,
        }
    }

    /// Wraps a memory store, counting catalog reads and optionally failing
    /// history writes.
    struct CountingStore {
        inner: MemoryStore,
        fetches: AtomicUsize,
        fail_history: bool,
    }

    impl BreedStore for CountingStore {
        fn name(&self) -> &str {
            "counting"
        }

        fn fetch_breeds(&self, query: BreedQuery) -> Result<Vec<Breed>, RecognitionError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_breeds(query)
        }

        fn insert_history(&self, record: &HistoryRecord) -> anyhow::Result<()> {
            if self.fail_history {
                bail!("store offline");
            }
            self.inner.insert_history(record)
        }

        fn recent_history(&self, limit: usize) -> anyhow::Result<Vec<HistoryRecord>> {
            self.inner.recent_history(limit)
        }
    }

    fn counting_store(fail_history: bool) -> Arc<CountingStore> {
        Arc::new(CountingStore {
            inner: MemoryStore::new(breeds()),
            fetches: AtomicUsize::new(0),
            fail_history,
        })
    }

    fn recognizer(store: Arc<CountingStore>, answer: &str, confidence: f64) -> BreedRecognizer {
        BreedRecognizer::new(
            store,
            Box::new(DryrunProvider::answering(answer, confidence)),
            "dryrun",
        )
        .with_jitter(Box::new(FixedJitter(10.0)))
    }

    #[test]
    fn gir_guess_is_matched_and_recorded() -> anyhow::Result<()> {
        let store = counting_store(false);
        let mut recognizer = recognizer(store.clone(), "Gir", 87.0);
        let result = recognizer.identify(&image())?;

        assert_eq!(result.breed.name, "Gir");
        assert_eq!(result.confidence, 87.0);
        assert_eq!(result.matched_by, MatchKind::Exact);
        assert_eq!(result.alternatives.len(), 3);
        assert!(result.alternatives.iter().all(|alt| alt.breed.id != "gir"));

        let history = store.recent_history(10)?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].breed_id.as_deref(), Some("gir"));
        assert_eq!(history[0].confidence_score, Some(87.0));
        assert_eq!(history[0].metadata.alternatives, 3);
        assert_eq!(history[0].image_data.as_deref().map(str::len), Some(100));
        Ok(())
    }

    #[test]
    fn stripped_name_match_is_returned() -> anyhow::Result<()> {
        let mut recognizer = recognizer(counting_store(false), "Red Sindhi (cattle)", 42.0);
        let result = recognizer.identify(&image())?;
        assert_eq!(result.breed.name, "Red Sindhi");
        assert_eq!(result.confidence, 42.0);
        assert_eq!(result.matched_by, MatchKind::ParentheticalStripped);
        Ok(())
    }

    #[test]
    fn unknown_answer_fails_without_history() -> anyhow::Result<()> {
        let store = counting_store(false);
        let mut recognizer = recognizer(store.clone(), "Unknown", 0.0);
        let err = recognizer.identify(&image()).err();
        assert_eq!(
            err.as_ref().map(|err| err.kind()),
            Some(RecognitionErrorKind::NoConfidentMatch)
        );
        let message = err.map(|err| err.to_string()).unwrap_or_default();
        assert!(message.contains("Unknown") && message.contains("0%"));
        assert!(store.recent_history(10)?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_credential_fails_before_store_or_network() {
        let store = counting_store(false);
        let config = EngineConfig {
            gemini_api_key: None,
            gemini_api_base: "http://127.0.0.1:9/v1beta".to_string(),
            ..EngineConfig::default()
        };
        let mut recognizer = BreedRecognizer::from_config(&config, store.clone());
        let err = recognizer.identify(&image()).err();
        assert!(err.as_ref().is_some_and(RecognitionError::is_configuration_missing));
        assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn history_failure_is_tolerated_unless_required() -> anyhow::Result<()> {
        let mut lenient = recognizer(counting_store(true), "Gir", 87.0);
        assert_eq!(lenient.identify(&image())?.breed.name, "Gir");

        let mut strict =
            recognizer(counting_store(true), "Gir", 87.0).with_history_policy(HistoryPolicy::Required);
        let err = strict.identify(&image()).err();
        assert_eq!(
            err.as_ref().map(|err| err.kind()),
            Some(RecognitionErrorKind::UnknownFailure)
        );
        assert!(err
            .map(|err| err.to_string())
            .unwrap_or_default()
            .contains("store offline"));
        Ok(())
    }

    #[test]
    fn lifecycle_events_are_logged_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let mut recognizer = recognizer(counting_store(false), "Gir", 87.0)
            .with_events(EventLog::new(&events_path, "session-test"))?;
        recognizer.identify(&image())?;

        let mut failing = recognizer_with_events(&events_path)?;
        let _ = failing.identify(&image());

        let raw = fs::read_to_string(&events_path)?;
        let types: Vec<String> = raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect();
        assert_eq!(
            types,
            vec![
                "session_started",
                "catalog_loaded",
                "ai_guess",
                "recognition_matched",
                "history_recorded",
                "session_started",
                "catalog_loaded",
                "ai_guess",
                "recognition_failed",
            ]
        );
        assert!(!raw.contains(&"C".repeat(300)));
        Ok(())
    }

    fn recognizer_with_events(path: &std::path::Path) -> anyhow::Result<BreedRecognizer> {
        recognizer(counting_store(false), "Holstein", 90.0).with_events(EventLog::new(path, "session-2"))
    }

    fn png_bytes(width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    /// Remembers the image descriptor it was asked about.
    struct CapturingProvider {
        seen: Arc<Mutex<Option<(String, u32, u32)>>>,
        answer: DryrunProvider,
    }

    impl VisionProvider for CapturingProvider {
        fn name(&self) -> &str {
            "capturing"
        }

        fn analyze(&self, request: &VisionRequest<'_>) -> Result<VisionReply, RecognitionError> {
            if let Ok(mut seen) = self.seen.lock() {
                *seen = Some((
                    request.image.mime_type.clone(),
                    request.image.width,
                    request.image.height,
                ));
            }
            self.answer.analyze(request)
        }
    }

    #[test]
    fn data_url_input_reaches_the_provider_normalized() -> anyhow::Result<()> {
        let seen = Arc::new(Mutex::new(None));
        let provider = CapturingProvider {
            seen: seen.clone(),
            answer: DryrunProvider::answering("Gir", 80.0),
        };
        let mut recognizer =
            BreedRecognizer::new(counting_store(false), Box::new(provider), "dryrun")
                .with_jitter(Box::new(FixedJitter(0.0)));

        let url = format!("data:image/png;base64,{}", BASE64.encode(png_bytes(1600, 1200)?));
        let result = recognizer.identify_data_url(&url)?;
        assert_eq!(result.breed.name, "Gir");

        let captured = seen.lock().map(|guard| guard.clone()).unwrap_or(None);
        assert_eq!(captured, Some(("image/jpeg".to_string(), 800, 600)));

        let kind = recognizer
            .identify_data_url("data:image/png;base64,@@@@")
            .err()
            .map(|err| err.kind());
        assert_eq!(kind, Some(RecognitionErrorKind::InvalidImage));
        Ok(())
    }

    #[test]
    fn unwritable_event_log_does_not_abort_recognition() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let store = counting_store(false);
        let mut recognizer = recognizer(store.clone(), "Gir", 90.0)
            .with_events(EventLog::new(&events_path, "session-broken"))?;

        fs::remove_file(&events_path)?;
        fs::create_dir(&events_path)?;

        let result = recognizer.identify(&image())?;
        assert_eq!(result.breed.name, "Gir");
        assert_eq!(result.confidence, 90.0);
        assert_eq!(store.recent_history(10)?.len(), 1);
        Ok(())
    }

    #[test]
    fn identify_file_normalizes_before_recognition() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("cow.png");
        fs::write(&path, png_bytes(1600, 900)?)?;

        let mut recognizer = recognizer(counting_store(false), "Ongole", 66.0);
        let result = recognizer.identify_file(&path)?;
        assert_eq!(result.breed.name, "Ongole");

        fs::write(&path, b"not an image")?;
        let kind = recognizer.identify_file(&path).err().map(|err| err.kind());
        assert_eq!(kind, Some(RecognitionErrorKind::InvalidImage));
        Ok(())
    }

    #[test]
    fn listing_is_sorted_and_filtered() -> anyhow::Result<()> {
        let recognizer = recognizer(counting_store(false), "Gir", 87.0);
        let buffaloes = recognizer.list_breeds(Some(BreedType::Buffalo))?;
        assert_eq!(buffaloes.len(), 1);
        let names: Vec<String> = recognizer
            .list_breeds(None)?
            .into_iter()
            .map(|breed| breed.name)
            .collect();
        assert_eq!(names, vec!["Gir", "Murrah", "Ongole", "Red Sindhi", "Sahiwal"]);
        Ok(())
    }
}
