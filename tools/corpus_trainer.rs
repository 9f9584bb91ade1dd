/// Corpus Trainer — builds a Markov chain from a tokenized corpus file and
/// prints chain statistics plus a handful of sample sentences.
///
/// Usage: corpus_trainer --input <data.txt> [--ngram <2|3|4>] [--count <n>] [--keep-spaces]
use chatter_engine::core::generator::{SentenceGenerator, SpacePolicy, DEFAULT_TRIES};
use chatter_engine::core::model::{ModelBuilder, ModelHandle};
use chatter_engine::core::tokenizer::WhitespaceSegmenter;
use std::env;
use std::process;
use std::sync::Arc;

const USAGE: &str =
    "Usage: corpus_trainer --input <data.txt> [--ngram <2|3|4>] [--count <n>] [--keep-spaces]";

fn main() {
    init_tracing();
    let args: Vec<String> = env::args().collect();

    let mut input = None;
    let mut ngram = 3usize;
    let mut count = 5usize;
    let mut spaces = SpacePolicy::Strip;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" if i + 1 < args.len() => {
                i += 1;
                input = Some(args[i].clone());
            }
            "--ngram" if i + 1 < args.len() => {
                i += 1;
                ngram = args[i].parse().unwrap_or_else(|_| {
                    eprintln!("Error: --ngram must be 2, 3, or 4");
                    process::exit(1);
                });
            }
            "--count" if i + 1 < args.len() => {
                i += 1;
                count = args[i].parse().unwrap_or_else(|_| {
                    eprintln!("Error: --count must be a number");
                    process::exit(1);
                });
            }
            "--keep-spaces" => spaces = SpacePolicy::Keep,
            "--help" | "-h" => {
                println!("{USAGE}");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("{USAGE}");
                process::exit(1);
            }
        }
        i += 1;
    }

    let input_path = input.unwrap_or_else(|| {
        eprintln!("Error: --input is required");
        eprintln!("{USAGE}");
        process::exit(1);
    });

    let text = std::fs::read_to_string(&input_path).unwrap_or_else(|e| {
        eprintln!("Error reading corpus '{}': {}", input_path, e);
        process::exit(1);
    });

    println!("Building {}-gram chain from '{}'...", ngram, input_path);
    let handle = ModelHandle::new();
    let model = ModelBuilder::new(handle.clone(), ngram, true)
        .build(&text)
        .unwrap_or_else(|e| {
            eprintln!("Error building model: {}", e);
            process::exit(1);
        });

    println!(
        "Chain built: {} sentences, {} states, {} transitions",
        model.sentence_count(),
        model.state_count(),
        model.transition_count()
    );
    handle.publish(model);

    let generator =
        SentenceGenerator::new(handle, Arc::new(WhitespaceSegmenter), DEFAULT_TRIES, spaces);
    println!();
    for n in 1..=count {
        match generator.try_generate(None) {
            Ok(sentence) => println!("{:>3}. {}", n, sentence),
            Err(e) => println!("{:>3}. <{}>", n, e),
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chatter_engine=info,warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
