/// Active model handle and the builder that publishes into it.
///
/// The handle holds at most one model. Publishing swaps the pointer; readers
/// that already loaded the previous model keep it alive until they drop it.
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::info;

use crate::core::markov::{MarkovError, MarkovModel, MarkovTrainer};

/// Shared reference to the currently published model.
#[derive(Debug, Clone, Default)]
pub struct ModelHandle {
    active: Arc<ArcSwapOption<MarkovModel>>,
}

impl ModelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the active model, if one has been published.
    pub fn current(&self) -> Option<Arc<MarkovModel>> {
        self.active.load_full()
    }

    pub fn is_ready(&self) -> bool {
        self.active.load().is_some()
    }

    /// Make `model` the active model.
    pub fn publish(&self, model: MarkovModel) {
        self.active.store(Some(Arc::new(model)));
    }
}

/// Builds chain models from corpus text and publishes them.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    handle: ModelHandle,
    ngram: usize,
    reject_malformed: bool,
}

impl ModelBuilder {
    pub fn new(handle: ModelHandle, ngram: usize, reject_malformed: bool) -> Self {
        Self {
            handle,
            ngram,
            reject_malformed,
        }
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    /// Build a model without publishing it.
    pub fn build(&self, corpus_text: &str) -> Result<MarkovModel, MarkovError> {
        let mut trainer = MarkovTrainer::new(self.ngram)?;
        if !self.reject_malformed {
            trainer = trainer.keep_malformed();
        }
        trainer.train(corpus_text)
    }

    /// Build a model and publish it. On failure the active model is untouched.
    pub fn rebuild(&self, corpus_text: &str) -> Result<(), MarkovError> {
        let model = self.build(corpus_text)?;
        info!(
            sentences = model.sentence_count(),
            states = model.state_count(),
            transitions = model.transition_count(),
            "model built"
        );
        self.handle.publish(model);
        Ok(())
    }
}
