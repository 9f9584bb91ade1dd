/// Word segmentation — turns raw message text into a space-joined token line.
///
/// The segmenter is pluggable; [`tokenize`] applies the normalisation every
/// corpus line needs regardless of segmenter.
use serde::{Deserialize, Serialize};

/// Splits text into an ordered sequence of tokens.
pub trait Segmenter: Send + Sync {
    fn segment(&self, text: &str) -> Vec<String>;
}

/// Which built-in segmenter to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SegmenterKind {
    /// Script-run segmentation for text written without spaces.
    #[default]
    ScriptRuns,
    /// Plain whitespace splitting for space-delimited languages.
    Whitespace,
}

impl SegmenterKind {
    pub fn build(self) -> Box<dyn Segmenter> {
        match self {
            Self::ScriptRuns => Box::new(ScriptSegmenter),
            Self::Whitespace => Box::new(WhitespaceSegmenter),
        }
    }
}

/// Segment `text` and join the tokens with single spaces.
///
/// The result never contains a newline, leading/trailing whitespace, or a
/// run of more than one space, so one message always maps to one line.
pub fn tokenize(segmenter: &dyn Segmenter, text: &str) -> String {
    let tokens = segmenter.segment(text);
    let mut out = String::with_capacity(text.len() + tokens.len());
    for tok in tokens.iter().flat_map(|t| t.split_whitespace()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(tok);
    }
    out
}

/// Splits on Unicode whitespace.
pub struct WhitespaceSegmenter;

impl Segmenter for WhitespaceSegmenter {
    fn segment(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }
}

/// Character classes used by [`ScriptSegmenter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Kanji,
    Hiragana,
    Katakana,
    Alnum,
    Space,
    Symbol,
}

fn classify(c: char) -> Script {
    match c {
        c if c.is_whitespace() => Script::Space,
        '\u{3041}'..='\u{309F}' => Script::Hiragana,
        '\u{30A0}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' | '\u{FF66}'..='\u{FF9F}' => {
            Script::Katakana
        }
        '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}' | '々' | '〆' => {
            Script::Kanji
        }
        c if c.is_alphanumeric() => Script::Alnum,
        _ => Script::Symbol,
    }
}

/// Dictionary-free segmenter for unspaced scripts.
///
/// Emits maximal runs of kanji, hiragana, katakana, and alphanumerics as
/// tokens. Every other symbol is a token on its own; whitespace separates
/// tokens and is dropped.
pub struct ScriptSegmenter;

impl Segmenter for ScriptSegmenter {
    fn segment(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut current_script = Script::Space;

        for c in text.chars() {
            let script = classify(c);
            // The prolonged sound mark continues whatever run it follows.
            let script = if c == 'ー' && current_script != Script::Space {
                current_script
            } else {
                script
            };

            let continues = script == current_script && script != Script::Symbol;
            if !continues && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            if script != Script::Space {
                current.push(c);
            }
            current_script = script;
        }

        if !current.is_empty() {
            tokens.push(current);
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_runs_split_japanese() {
        let tokens = ScriptSegmenter.segment("今日はカレーを食べた");
        assert_eq!(tokens, vec!["今日", "は", "カレー", "を", "食", "べた"]);
    }

    #[test]
    fn script_runs_keep_latin_words() {
        let tokens = ScriptSegmenter.segment("Rustで書いた bot2号");
        assert_eq!(tokens, vec!["Rust", "で", "書", "いた", "bot2", "号"]);
    }

    #[test]
    fn symbols_are_single_tokens() {
        let tokens = ScriptSegmenter.segment("えっ!?本当");
        assert_eq!(tokens, vec!["えっ", "!", "?", "本当"]);
    }

    #[test]
    fn tokenize_collapses_whitespace_and_newlines() {
        let line = tokenize(&WhitespaceSegmenter, "  hello \n\n  big\tworld  ");
        assert_eq!(line, "hello big world");
    }

    #[test]
    fn tokenize_is_deterministic() {
        let text = "明日は雨らしい。傘を持っていこう";
        let first = tokenize(&ScriptSegmenter, text);
        for _ in 0..5 {
            assert_eq!(tokenize(&ScriptSegmenter, text), first);
        }
        assert!(!first.contains("  "));
        assert_eq!(first, first.trim());
    }

    #[test]
    fn tokenize_empty_text() {
        assert_eq!(tokenize(&ScriptSegmenter, "   \n "), "");
    }

    #[test]
    fn kind_builds_matching_segmenter() {
        let seg = SegmenterKind::Whitespace.build();
        assert_eq!(seg.segment("a b"), vec!["a", "b"]);
    }
}
