mod gemini;

use std::collections::BTreeMap;

use breedscan_contracts::RecognitionError;
use serde_json::{json, Map, Value};

use crate::config::EngineConfig;
use crate::normalizer::ImagePayload;

pub use gemini::GeminiProvider;

/// One recognition call sent to a vision model.
#[derive(Debug, Clone)]
pub struct VisionRequest<'a> {
    pub model: &'a str,
    pub prompt: String,
    pub image: &'a ImagePayload,
    pub breed_names: Vec<String>,
}

/// Raw text answer of a vision model plus a redacted trace of the exchange.
#[derive(Debug, Clone, Default)]
pub struct VisionReply {
    pub text: String,
    pub provider_request: Map<String, Value>,
    pub provider_response: Map<String, Value>,
}

pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fails when the provider cannot be called at all (missing credential).
    /// Checked before any network traffic.
    fn ensure_configured(&self) -> Result<(), RecognitionError> {
        Ok(())
    }

    fn analyze(&self, request: &VisionRequest<'_>) -> Result<VisionReply, RecognitionError>;
}

#[derive(Default)]
pub struct VisionProviderRegistry {
    providers: BTreeMap<String, Box<dyn VisionProvider>>,
}

impl VisionProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: VisionProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn VisionProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn take(&mut self, name: &str) -> Option<Box<dyn VisionProvider>> {
        self.providers.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry(config: &EngineConfig) -> VisionProviderRegistry {
    let mut providers = VisionProviderRegistry::new();
    providers.register(DryrunProvider::default());
    providers.register(GeminiProvider::new(config));
    providers
}

/// Offline provider. Answers with a fixed breed, or with the first catalog
/// entry when none is set.
#[derive(Debug, Clone)]
pub struct DryrunProvider {
    breed: Option<String>,
    confidence: f64,
}

impl Default for DryrunProvider {
    fn default() -> Self {
        Self {
            breed: None,
            confidence: 50.0,
        }
    }
}

impl DryrunProvider {
    pub fn answering(breed: impl Into<String>, confidence: f64) -> Self {
        Self {
            breed: Some(breed.into()),
            confidence,
        }
    }
}

impl VisionProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn analyze(&self, request: &VisionRequest<'_>) -> Result<VisionReply, RecognitionError> {
        let breed = self
            .breed
            .clone()
            .or_else(|| request.breed_names.first().cloned())
            .unwrap_or_else(|| breedscan_contracts::recognition::UNKNOWN_BREED.to_string());
        let answer = json!({
            "identifiedBreed": breed,
            "confidence": self.confidence,
            "reasoning": "dryrun provider: no model was consulted",
            "characteristics": [],
        });
        Ok(VisionReply {
            text: answer.to_string(),
            provider_request: map_object(json!({
                "endpoint": "dryrun",
                "model": request.model,
                "image": {
                    "mime_type": request.image.mime_type,
                    "width": request.image.width,
                    "height": request.image.height,
                },
            })),
            provider_response: map_object(json!({ "status": "ok" })),
        })
    }
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use breedscan_contracts::recognition::AiGuess;

    use super::{default_provider_registry, DryrunProvider, VisionProvider, VisionRequest};
    use crate::config::EngineConfig;
    use crate::normalizer::ImagePayload;

    fn payload() -> ImagePayload {
        ImagePayload {
            mime_type: "image/jpeg".to_string(),
            data: "AAAA".to_string(),
            width: 4,
            height: 3,
        }
    }

    #[test]
    fn registry_lists_and_hands_out_providers() {
        let mut registry = default_provider_registry(&EngineConfig::default());
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get("gemini").is_some());
        let taken = registry.take("dryrun");
        assert_eq!(taken.map(|provider| provider.name().to_string()), Some("dryrun".to_string()));
        assert_eq!(registry.names(), vec!["gemini"]);
    }

    #[test]
    fn dryrun_answers_with_first_catalog_breed() -> anyhow::Result<()> {
        let image = payload();
        let request = VisionRequest {
            model: "dryrun",
            prompt: String::new(),
            image: &image,
            breed_names: vec!["Sahiwal".to_string(), "Gir".to_string()],
        };
        let reply = DryrunProvider::default().analyze(&request)?;
        let guess = AiGuess::from_reply_text(&reply.text)?;
        assert_eq!(guess.identified_breed, "Sahiwal");
        assert_eq!(guess.confidence, 50.0);
        assert!(reply.provider_request["image"].get("data").is_none());

        let fixed = DryrunProvider::answering("Murrah", 77.0).analyze(&request)?;
        assert_eq!(AiGuess::from_reply_text(&fixed.text)?.identified_breed, "Murrah");
        Ok(())
    }

    #[test]
    fn dryrun_without_catalog_reports_unknown() -> anyhow::Result<()> {
        let image = payload();
        let request = VisionRequest {
            model: "dryrun",
            prompt: String::new(),
            image: &image,
            breed_names: Vec::new(),
        };
        let reply = DryrunProvider::default().analyze(&request)?;
        assert!(AiGuess::from_reply_text(&reply.text)?.is_unknown());
        Ok(())
    }
}
