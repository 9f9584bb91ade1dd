/// Generation integration tests — corpus text to published model to sentences.
use chatter_engine::core::generator::{GenerateError, SentenceGenerator, SpacePolicy, DEFAULT_TRIES};
use chatter_engine::core::markov::MarkovError;
use chatter_engine::core::model::{ModelBuilder, ModelHandle};
use chatter_engine::core::tokenizer::{ScriptSegmenter, WhitespaceSegmenter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn fixture_corpus() -> String {
    std::fs::read_to_string("tests/fixtures/chat_corpus.txt").unwrap()
}

fn generator(handle: &ModelHandle, spaces: SpacePolicy) -> SentenceGenerator {
    SentenceGenerator::new(handle.clone(), Arc::new(ScriptSegmenter), DEFAULT_TRIES, spaces)
        .with_rng_seed(42)
}

#[test]
fn empty_corpus_publishes_nothing() {
    let handle = ModelHandle::new();
    let builder = ModelBuilder::new(handle.clone(), 3, true);

    assert_eq!(builder.rebuild(""), Err(MarkovError::EmptyCorpus));
    assert!(!handle.is_ready());
    assert_eq!(generator(&handle, SpacePolicy::Strip).generate(None), None);
}

#[test]
fn failed_rebuild_keeps_previous_model() {
    let handle = ModelHandle::new();
    let builder = ModelBuilder::new(handle.clone(), 3, true);
    builder.rebuild(&fixture_corpus()).unwrap();
    let before = handle.current().unwrap();

    assert!(builder.rebuild("\n\n").is_err());
    assert!(Arc::ptr_eq(&before, &handle.current().unwrap()));
}

#[test]
fn repetitive_corpus_generates_sentences() {
    let handle = ModelHandle::new();
    ModelBuilder::new(handle.clone(), 3, true)
        .rebuild("a b c d\na b e f\nx b c g")
        .unwrap();
    let gen = generator(&handle, SpacePolicy::Keep);
    let sentence = gen.generate(None).unwrap();
    assert!(!sentence.is_empty());

    let handle = ModelHandle::new();
    ModelBuilder::new(handle.clone(), 3, true)
        .rebuild(&fixture_corpus())
        .unwrap();
    let gen = generator(&handle, SpacePolicy::Strip);
    for _ in 0..20 {
        let sentence = gen.generate(None).unwrap();
        assert!(!sentence.is_empty());
        assert!(!sentence.contains(' '));
    }
}

#[test]
fn seeded_sentence_starts_with_seed() {
    let handle = ModelHandle::new();
    ModelBuilder::new(handle.clone(), 3, true)
        .rebuild(&fixture_corpus())
        .unwrap();
    let gen = generator(&handle, SpacePolicy::Strip);

    for _ in 0..10 {
        let sentence = gen.try_generate(Some("今日は")).unwrap();
        assert!(sentence.starts_with("今日は"), "{sentence}");
        assert_ne!(sentence, "今日はいい天気ですね");
    }
}

#[test]
fn seed_mid_sentence_is_not_found() {
    let handle = ModelHandle::new();
    ModelBuilder::new(handle.clone(), 3, true)
        .rebuild(&fixture_corpus())
        .unwrap();
    let gen = generator(&handle, SpacePolicy::Strip);

    assert_eq!(
        gen.try_generate(Some("降って")),
        Err(GenerateError::SeedNotFound("降って".to_string()))
    );
}

#[test]
fn seed_with_only_copied_continuations_exhausts() {
    let handle = ModelHandle::new();
    ModelBuilder::new(handle.clone(), 3, true)
        .rebuild(&fixture_corpus())
        .unwrap();
    let gen = SentenceGenerator::new(handle, Arc::new(ScriptSegmenter), 20, SpacePolicy::Strip);

    // Every sentence starting with 散歩 reproduces a training line.
    assert_eq!(gen.try_generate(Some("散歩")), Err(GenerateError::Exhausted(20)));
}

#[test]
fn readers_never_see_a_missing_model_during_rebuilds() {
    let handle = ModelHandle::new();
    let builder = ModelBuilder::new(handle.clone(), 3, true);
    builder.rebuild(&fixture_corpus()).unwrap();

    let gen = Arc::new(
        SentenceGenerator::new(
            handle.clone(),
            Arc::new(WhitespaceSegmenter),
            DEFAULT_TRIES,
            SpacePolicy::Keep,
        )
        .with_rng_seed(3),
    );
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let gen = gen.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut generated = 0;
                while generated < 20 || !done.load(Ordering::SeqCst) {
                    assert!(gen.generate(None).is_some());
                    generated += 1;
                }
            })
        })
        .collect();

    let corpora = [fixture_corpus(), "x y z\nx y w\n".to_string()];
    for i in 0..50 {
        builder.rebuild(&corpora[i % 2]).unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        reader.join().unwrap();
    }
}
