use std::sync::Arc;

use anyhow::Result;
use breedscan_contracts::recognition::{HistoryMetadata, HistoryRecord, RecognitionResult};

use crate::normalizer::ImagePayload;
use crate::store::BreedStore;

/// Writes one audit row per successful recognition.
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn BreedStore>,
    user_id: Option<String>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn BreedStore>) -> Self {
        Self {
            store,
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn record(
        &self,
        breed_id: &str,
        confidence: f64,
        image: &ImagePayload,
        metadata: HistoryMetadata,
    ) -> Result<HistoryRecord> {
        let record = HistoryRecord::new(breed_id, confidence, &image.to_data_url(), metadata)
            .with_user(self.user_id.clone());
        self.store.insert_history(&record)?;
        Ok(record)
    }

    /// Audit row for `result`, metadata included.
    pub fn record_result(
        &self,
        result: &RecognitionResult,
        image: &ImagePayload,
        model: &str,
    ) -> Result<HistoryRecord> {
        let metadata = HistoryMetadata {
            reasoning: result.reasoning.clone(),
            characteristics: result.observed_traits.clone(),
            alternatives: result.alternatives.len(),
            matched_by: Some(result.matched_by.as_str().to_string()),
            model: Some(model.to_string()),
            image_sha256: Some(image.sha256_hex()),
        };
        self.record(&result.breed.id, result.confidence, image, metadata)
    }
}
