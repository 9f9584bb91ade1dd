/// Markov chain sentence model — training, walking, seeded starts, and the
/// originality check.
///
/// Every corpus line is one sentence of whitespace-separated tokens.
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkovError {
    #[error("corpus has no usable sentences")]
    EmptyCorpus,
    #[error("n-gram depth must be 2-4, got {0}")]
    InvalidNgram(usize),
}

/// Special token marking sentence start.
const SENTENCE_START: &str = "<S>";
/// Special token marking sentence end.
const SENTENCE_END: &str = "</S>";

/// Upper bound on tokens in one walk; longer walks are discarded.
const MAX_WALK_TOKENS: usize = 512;

/// Default originality thresholds: a sentence may not copy more than
/// `min(MAX_OVERLAP_TOTAL, round(MAX_OVERLAP_RATIO * len))` consecutive
/// words from the corpus.
pub const MAX_OVERLAP_RATIO: f64 = 0.7;
pub const MAX_OVERLAP_TOTAL: usize = 15;

/// Lines with unbalanced-looking quotes or brackets are poor training data.
static MALFORMED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(^')|('$)|\s'|'\s|["(\)\[\]]"#).unwrap());

type Transitions = FxHashMap<Vec<String>, Vec<(String, u32)>>;

/// A trained Markov model storing n-gram transition counts.
#[derive(Debug, Clone, Default)]
pub struct MarkovModel {
    /// N-gram depth (3 means states of two tokens).
    pub n: usize,
    /// Transition table: state → [(next_token, count)].
    pub transitions: Transitions,
    /// Training sentences, one per line, for the originality check.
    rejoined: String,
    sentence_count: usize,
}

/// Why a seeded start could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    /// The seed has no tokens.
    EmptySeed,
    /// No training sentence begins with the seed.
    NotInChain,
}

impl MarkovModel {
    /// Number of training sentences.
    pub fn sentence_count(&self) -> usize {
        self.sentence_count
    }

    /// Number of distinct states.
    pub fn state_count(&self) -> usize {
        self.transitions.len()
    }

    /// Total distinct (state, next) edges.
    pub fn transition_count(&self) -> usize {
        self.transitions.values().map(Vec::len).sum()
    }

    fn state_size(&self) -> usize {
        self.n - 1
    }

    fn begin_state(&self) -> Vec<String> {
        vec![SENTENCE_START.to_string(); self.state_size()]
    }

    /// Walk the chain from the sentence start until an end marker.
    ///
    /// Returns `None` for walks that hit a dead state or run past the
    /// token cap.
    pub fn walk(&self, rng: &mut StdRng) -> Option<Vec<String>> {
        self.walk_from(self.begin_state(), rng)
    }

    fn walk_from(&self, mut state: Vec<String>, rng: &mut StdRng) -> Option<Vec<String>> {
        let mut tokens = Vec::new();
        loop {
            let next = pick_next(&self.transitions, &state, rng)?;
            if next == SENTENCE_END {
                return Some(tokens);
            }
            if tokens.len() >= MAX_WALK_TOKENS {
                return None;
            }
            tokens.push(next.clone());
            state.remove(0);
            state.push(next);
        }
    }

    /// Resolve the chain state reached by starting a sentence with `seed`.
    ///
    /// Every step of the seed must be a transition seen in training.
    pub fn start_state(&self, seed: &[String]) -> Result<Vec<String>, StartError> {
        if seed.is_empty() {
            return Err(StartError::EmptySeed);
        }
        let mut state = self.begin_state();
        for tok in seed {
            let seen = self
                .transitions
                .get(&state)
                .is_some_and(|opts| opts.iter().any(|(t, _)| t == tok));
            if !seen {
                return Err(StartError::NotInChain);
            }
            state.remove(0);
            state.push(tok.clone());
        }
        Ok(state)
    }

    /// Walk a sentence that begins with `seed`, returning the full token list.
    pub fn walk_with_start(
        &self,
        seed: &[String],
        rng: &mut StdRng,
    ) -> Result<Option<Vec<String>>, StartError> {
        let state = self.start_state(seed)?;
        Ok(self.walk_from(state, rng).map(|rest| {
            let mut tokens = seed.to_vec();
            tokens.extend(rest);
            tokens
        }))
    }

    /// Whether `tokens` avoids copying a long run of training text verbatim.
    pub fn is_original(&self, tokens: &[String]) -> bool {
        let overlap_max = MAX_OVERLAP_TOTAL
            .min((MAX_OVERLAP_RATIO * tokens.len() as f64).round() as usize);
        let gram_len = overlap_max + 1;
        if tokens.len() < gram_len {
            return !self.contains_run(tokens);
        }
        tokens.windows(gram_len).all(|gram| !self.contains_run(gram))
    }

    fn contains_run(&self, gram: &[String]) -> bool {
        let needle = gram.join(" ");
        !needle.is_empty() && self.rejoined.contains(&needle)
    }
}

/// Pick the next token from transitions given a state prefix.
fn pick_next(transitions: &Transitions, state: &[String], rng: &mut StdRng) -> Option<String> {
    let options = transitions.get(state)?;
    if options.is_empty() {
        return None;
    }

    let weights: Vec<u32> = options.iter().map(|(_, count)| *count).collect();
    let dist = WeightedIndex::new(&weights).ok()?;
    Some(options[dist.sample(rng)].0.clone())
}

/// Trains Markov models from newline-delimited corpus text.
pub struct MarkovTrainer {
    n: usize,
    reject_malformed: bool,
}

impl MarkovTrainer {
    pub fn new(n: usize) -> Result<Self, MarkovError> {
        if !(2..=4).contains(&n) {
            return Err(MarkovError::InvalidNgram(n));
        }
        Ok(Self {
            n,
            reject_malformed: true,
        })
    }

    /// Keep lines with stray quotes or brackets instead of skipping them.
    pub fn keep_malformed(mut self) -> Self {
        self.reject_malformed = false;
        self
    }

    /// Train a model from corpus text, one sentence per line.
    pub fn train(&self, text: &str) -> Result<MarkovModel, MarkovError> {
        let mut transitions: Transitions = FxHashMap::default();
        let mut rejoined = String::new();
        let mut sentence_count = 0;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if self.reject_malformed && MALFORMED.is_match(trimmed) {
                continue;
            }

            let words: Vec<&str> = trimmed.split_whitespace().collect();
            let mut padded = vec![SENTENCE_START.to_string(); self.n - 1];
            padded.extend(words.iter().map(|w| w.to_string()));
            padded.push(SENTENCE_END.to_string());

            for window in padded.windows(self.n) {
                let prefix = window[..self.n - 1].to_vec();
                let next = window[self.n - 1].clone();
                add_transition(&mut transitions, prefix, next);
            }

            if !rejoined.is_empty() {
                rejoined.push('\n');
            }
            rejoined.push_str(&words.join(" "));
            sentence_count += 1;
        }

        if sentence_count == 0 {
            return Err(MarkovError::EmptyCorpus);
        }

        Ok(MarkovModel {
            n: self.n,
            transitions,
            rejoined,
            sentence_count,
        })
    }
}

/// Add a transition to a transition table, incrementing the count.
fn add_transition(table: &mut Transitions, prefix: Vec<String>, next: String) {
    let entries = table.entry(prefix).or_default();
    if let Some(entry) = entries.iter_mut().find(|(tok, _)| tok == &next) {
        entry.1 += 1;
    } else {
        entries.push((next, 1));
    }
}
