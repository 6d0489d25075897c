use breedscan_contracts::breeds::BreedCatalog;
use breedscan_contracts::recognition::AiGuess;
use breedscan_contracts::RecognitionError;
use tracing::debug;

use crate::normalizer::ImagePayload;
use crate::providers::{VisionProvider, VisionReply, VisionRequest};

pub fn build_prompt(catalog: &BreedCatalog) -> String {
    format!(
        "You are an expert in identifying Indian cattle and buffalo breeds. \
Analyze this image and identify the breed from this list:\n\n\
{listing}\n\n\
Respond ONLY with valid JSON in this exact format:\n\
{{\n  \"identifiedBreed\": \"exact breed name from the list\",\n  \"confidence\": number between 0-100,\n  \"reasoning\": \"brief explanation of identification\",\n  \"characteristics\": [\"observed feature 1\", \"observed feature 2\", \"observed feature 3\"]\n}}\n\n\
If the image is NOT a cattle or buffalo, return confidence as 0 and identifiedBreed as \"Unknown\".",
        listing = catalog.prompt_listing()
    )
}

/// Asks `provider` which catalog breed `image` shows.
pub fn request_guess(
    provider: &dyn VisionProvider,
    model: &str,
    image: &ImagePayload,
    catalog: &BreedCatalog,
) -> Result<(AiGuess, VisionReply), RecognitionError> {
    let request = VisionRequest {
        model,
        prompt: build_prompt(catalog),
        image,
        breed_names: catalog.names(),
    };
    let reply = provider.analyze(&request)?;
    let guess = AiGuess::from_reply_text(&reply.text)?;
    debug!(
        provider = provider.name(),
        identified = %guess.identified_breed,
        confidence = guess.confidence,
        "model answered"
    );
    Ok((guess, reply))
}

#[cfg(test)]
mod tests {
    use breedscan_contracts::breeds::{Breed, BreedCatalog, BreedType};
    use breedscan_contracts::error::RecognitionErrorKind;
    use breedscan_contracts::RecognitionError;

    use super::{build_prompt, request_guess};
    use crate::normalizer::ImagePayload;
    use crate::providers::{DryrunProvider, VisionProvider, VisionReply, VisionRequest};

    struct CannedProvider(&'static str);

    impl VisionProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        fn analyze(&self, _request: &VisionRequest<'_>) -> Result<VisionReply, RecognitionError> {
            Ok(VisionReply {
                text: self.0.to_string(),
                ..VisionReply::default()
            })
        }
    }

    fn catalog() -> BreedCatalog {
        BreedCatalog::new(vec![
            Breed::new("1", "Gir", BreedType::Cattle).with_description("Domed forehead, long ears"),
            Breed::new("2", "Murrah", BreedType::Buffalo),
        ])
    }

    fn image() -> ImagePayload {
        ImagePayload {
            mime_type: "image/jpeg".to_string(),
            data: "AAAA".to_string(),
            width: 2,
            height: 2,
        }
    }

    #[test]
    fn prompt_lists_catalog_and_json_contract() {
        let prompt = build_prompt(&catalog());
        assert!(prompt.contains("Gir (cattle) - Domed forehead, long ears"));
        assert!(prompt.contains("Murrah (buffalo)"));
        for field in ["identifiedBreed", "confidence", "reasoning", "characteristics"] {
            assert!(prompt.contains(&format!("\"{field}\"")));
        }
        assert!(prompt.contains("identifiedBreed as \"Unknown\""));
    }

    #[test]
    fn guess_is_parsed_and_clamped() -> anyhow::Result<()> {
        let provider = CannedProvider(r#"Result: {"identifiedBreed": "Gir", "confidence": 180}"#);
        let (guess, _) = request_guess(&provider, "m", &image(), &catalog())?;
        assert_eq!(guess.identified_breed, "Gir");
        assert_eq!(guess.confidence, 100.0);
        Ok(())
    }

    #[test]
    fn prose_only_reply_is_malformed() {
        let provider = CannedProvider("It looks like a cow to me.");
        let kind = request_guess(&provider, "m", &image(), &catalog())
            .err()
            .map(|err| err.kind());
        assert_eq!(kind, Some(RecognitionErrorKind::MalformedAiResponse));
    }

    #[test]
    fn dryrun_provider_sees_catalog_names() -> anyhow::Result<()> {
        let (guess, reply) = request_guess(&DryrunProvider::default(), "dryrun", &image(), &catalog())?;
        assert_eq!(guess.identified_breed, "Gir");
        assert_eq!(reply.provider_request["model"], serde_json::json!("dryrun"));
        Ok(())
    }
}
