//! Reconciles the model's breed name with the catalog and ranks related
//! breeds.
//!
//! The alternative ranking is UI sugar ("other possible matches"), not a
//! measured similarity: every score carries a random component, so repeated
//! calls with identical input are not expected to agree.

use breedscan_contracts::breeds::{Breed, BreedCatalog};
use breedscan_contracts::recognition::{AiGuess, AlternativeMatch, MatchKind, RecognitionResult};
use breedscan_contracts::RecognitionError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Minimum confidence for a match found only after stripping parentheses.
pub const CONFIDENCE_FLOOR: f64 = 10.0;
pub const MAX_ALTERNATIVES: usize = 3;
pub const JITTER_RANGE: f64 = 35.0;

const SAME_TYPE_SCORE: f64 = 30.0;
const SAME_ORIGIN_SCORE: f64 = 20.0;
const SAME_USE_SCORE: f64 = 15.0;

/// Source of the random component added to each alternative's score.
pub trait ScoreJitter: Send {
    /// A value in `[0, 35)`.
    fn next_jitter(&mut self) -> f64;
}

pub struct RandomJitter {
    rng: StdRng,
}

impl RandomJitter {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreJitter for RandomJitter {
    fn next_jitter(&mut self) -> f64 {
        self.rng.gen_range(0.0..JITTER_RANGE)
    }
}

/// Always returns the same jitter.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl ScoreJitter for FixedJitter {
    fn next_jitter(&mut self) -> f64 {
        if self.0.is_nan() {
            return 0.0;
        }
        self.0.clamp(0.0, JITTER_RANGE - f64::EPSILON * JITTER_RANGE)
    }
}

/// Exact name first; the parenthetical-stripped name only when confidence
/// reaches the floor.
pub fn match_breed<'a>(guess: &AiGuess, catalog: &'a BreedCatalog) -> Option<(&'a Breed, MatchKind)> {
    if guess.is_unknown() {
        return None;
    }
    if let Some(breed) = catalog.find_exact(&guess.identified_breed) {
        return Some((breed, MatchKind::Exact));
    }
    if guess.confidence < CONFIDENCE_FLOOR {
        return None;
    }
    catalog
        .find_stripped(&guess.identified_breed)
        .map(|breed| (breed, MatchKind::ParentheticalStripped))
}

pub fn reconcile(
    guess: &AiGuess,
    catalog: &BreedCatalog,
    jitter: &mut dyn ScoreJitter,
) -> Result<RecognitionResult, RecognitionError> {
    let Some((breed, matched_by)) = match_breed(guess, catalog) else {
        return Err(RecognitionError::NoConfidentMatch {
            detected: guess.identified_breed.clone(),
            confidence: guess.confidence,
        });
    };

    Ok(RecognitionResult {
        breed: breed.clone(),
        confidence: guess.confidence,
        alternatives: rank_alternatives(breed, guess.confidence, catalog, jitter),
        matched_by,
        reasoning: guess.reasoning.clone(),
        observed_traits: guess.characteristics.clone(),
    })
}

/// Up to three other breeds, each shown at
/// `min(match_confidence - 10, affinity + jitter)`, best first.
pub fn rank_alternatives(
    matched: &Breed,
    match_confidence: f64,
    catalog: &BreedCatalog,
    jitter: &mut dyn ScoreJitter,
) -> Vec<AlternativeMatch> {
    let ceiling = match_confidence - CONFIDENCE_FLOOR;
    let mut ranked: Vec<AlternativeMatch> = catalog
        .breeds()
        .iter()
        .filter(|candidate| candidate.id != matched.id)
        .map(|candidate| {
            let score = affinity_score(candidate, matched) + jitter.next_jitter();
            AlternativeMatch {
                breed: candidate.clone(),
                confidence: ceiling.min(score),
            }
        })
        .collect();
    ranked.sort_by(|left, right| right.confidence.total_cmp(&left.confidence));
    ranked.truncate(MAX_ALTERNATIVES);
    ranked
}

fn affinity_score(candidate: &Breed, matched: &Breed) -> f64 {
    let mut score = 0.0;
    if candidate.breed_type == matched.breed_type {
        score += SAME_TYPE_SCORE;
    }
    if candidate.origin_state == matched.origin_state {
        score += SAME_ORIGIN_SCORE;
    }
    if candidate.primary_use == matched.primary_use {
        score += SAME_USE_SCORE;
    }
    score
}
