/// Preview — interactive generation shell over a corpus file.
///
/// Usage: preview --input <data.txt> [--seed <n>] [--whitespace]
///
/// Each line typed is used as the start of the sentence; an empty line
/// generates without a start. Commands:
///   :stats  — chain statistics
///   help    — list commands
///   quit    — exit
use chatter_engine::core::generator::{SentenceGenerator, DEFAULT_TRIES};
use chatter_engine::core::model::{ModelBuilder, ModelHandle};
use chatter_engine::core::tokenizer::SegmenterKind;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut input = None;
    let mut seed: Option<u64> = None;
    let mut segmenter = SegmenterKind::ScriptRuns;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" if i + 1 < args.len() => {
                i += 1;
                input = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().ok();
            }
            "--whitespace" => segmenter = SegmenterKind::Whitespace,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(input) = input else {
        eprintln!("Error: --input is required");
        print_usage();
        std::process::exit(1);
    };

    let text = match std::fs::read_to_string(&input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("ERROR reading corpus {}: {}", input, e);
            std::process::exit(1);
        }
    };

    let handle = ModelHandle::new();
    if let Err(e) = ModelBuilder::new(handle.clone(), 3, true).rebuild(&text) {
        eprintln!("ERROR building model: {}", e);
        std::process::exit(1);
    }

    let mut generator = SentenceGenerator::new(
        handle.clone(),
        Arc::from(segmenter.build()),
        DEFAULT_TRIES,
        Default::default(),
    );
    if let Some(seed) = seed {
        generator = generator.with_rng_seed(seed);
        println!("Seed: {}", seed);
    }
    println!("Loaded corpus: {}", input);
    println!("Type a start phrase, an empty line, or 'help'.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim();

        match line {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "?" => print_help(),
            ":stats" => {
                if let Some(model) = handle.current() {
                    println!(
                        "{} sentences, {} states, {} transitions",
                        model.sentence_count(),
                        model.state_count(),
                        model.transition_count()
                    );
                }
            }
            start => {
                let start = (!start.is_empty()).then_some(start);
                match generator.try_generate(start) {
                    Ok(sentence) => println!("{}", sentence),
                    Err(e) => println!("ERROR: {}", e),
                }
            }
        }
    }
}

fn print_usage() {
    println!("Preview — interactive generation shell over a corpus file.");
    println!();
    println!("Usage: preview --input <data.txt> [--seed <n>] [--whitespace]");
    println!();
    println!("  --input <path>  Tokenized corpus, one sentence per line");
    println!("  --seed <n>      Fixed RNG seed");
    println!("  --whitespace    Split start phrases on whitespace instead of script runs");
}

fn print_help() {
    println!("Commands:");
    println!("  <text>   Generate a sentence starting with <text>");
    println!("  <empty>  Generate a sentence");
    println!("  :stats   Show chain statistics");
    println!("  help     Show this help");
    println!("  quit     Exit");
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chatter_engine=info,warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
