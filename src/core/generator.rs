/// Sentence generation from the active model with bounded retries.
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

use crate::core::markov::{MarkovModel, StartError};
use crate::core::model::ModelHandle;
use crate::core::tokenizer::Segmenter;

/// Reference retry bound.
pub const DEFAULT_TRIES: u32 = 250;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("no model has been built yet")]
    NotReady,
    #[error("no sentence starts with {0:?}")]
    SeedNotFound(String),
    #[error("generation failed after {0} attempts")]
    Exhausted(u32),
}

/// What to do with the artificial spaces tokenization introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpacePolicy {
    /// Remove all whitespace, for languages written without spaces.
    #[default]
    Strip,
    /// Keep tokens separated by single spaces.
    Keep,
}

impl SpacePolicy {
    pub fn apply(self, tokens: &[String]) -> String {
        match self {
            Self::Strip => tokens
                .iter()
                .flat_map(|t| t.chars())
                .filter(|c| !c.is_whitespace())
                .collect(),
            Self::Keep => tokens.join(" "),
        }
    }
}

/// Samples sentences from whatever model is currently published.
pub struct SentenceGenerator {
    model: ModelHandle,
    segmenter: Arc<dyn Segmenter>,
    tries: u32,
    spaces: SpacePolicy,
    rng: Mutex<StdRng>,
}

impl SentenceGenerator {
    pub fn new(
        model: ModelHandle,
        segmenter: Arc<dyn Segmenter>,
        tries: u32,
        spaces: SpacePolicy,
    ) -> Self {
        Self {
            model,
            segmenter,
            tries: tries.max(1),
            spaces,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Use a fixed RNG seed, for reproducible output.
    pub fn with_rng_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_ready()
    }

    /// Generate a sentence, optionally starting with `seed`.
    ///
    /// `None` when no model is published or every attempt failed.
    pub fn generate(&self, seed: Option<&str>) -> Option<String> {
        self.try_generate(seed).ok()
    }

    /// Like [`generate`](Self::generate), reporting why nothing came out.
    pub fn try_generate(&self, seed: Option<&str>) -> Result<String, GenerateError> {
        let model = self.model.current().ok_or(GenerateError::NotReady)?;
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let tokens = match seed.map(str::trim).filter(|s| !s.is_empty()) {
            Some(seed) => self.sample_with_start(&model, seed, &mut rng)?,
            None => self.sample(&model, &mut rng)?,
        };
        Ok(self.spaces.apply(&tokens))
    }

    fn sample(&self, model: &MarkovModel, rng: &mut StdRng) -> Result<Vec<String>, GenerateError> {
        for _ in 0..self.tries {
            if let Some(tokens) = model.walk(rng).filter(|t| !t.is_empty()) {
                return Ok(tokens);
            }
        }
        debug!(tries = self.tries, "unseeded generation exhausted");
        Err(GenerateError::Exhausted(self.tries))
    }

    fn sample_with_start(
        &self,
        model: &MarkovModel,
        seed: &str,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, GenerateError> {
        let seed_tokens = self.segmenter.segment(seed);
        for _ in 0..self.tries {
            match model.walk_with_start(&seed_tokens, rng) {
                Ok(Some(tokens)) if model.is_original(&tokens) => return Ok(tokens),
                Ok(_) => continue,
                Err(StartError::EmptySeed | StartError::NotInChain) => {
                    return Err(GenerateError::SeedNotFound(seed.to_string()));
                }
            }
        }
        debug!(tries = self.tries, seed, "seeded generation exhausted");
        Err(GenerateError::Exhausted(self.tries))
    }
}
