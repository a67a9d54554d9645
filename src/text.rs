//! Text normalization and tokenization applied before embedding lookup.

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::constants::text::{STOP_WORDS, URL_PLACEHOLDER};
use crate::types::Token;

/// Controls how raw post text is cleaned before tokenization.
#[derive(Clone, Debug)]
pub struct CleaningOptions {
    /// Remove URLs entirely instead of replacing them with a placeholder token.
    pub remove_urls: bool,
    /// Drop English stop words.
    pub drop_stop_words: bool,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            remove_urls: true,
            drop_stop_words: true,
        }
    }
}

/// Clean `text` and split it into word tokens.
///
/// An empty result means the post has no usable content.
pub fn tokenize(text: &str, options: &CleaningOptions) -> Vec<Token> {
    let plain = strip_html_tags(text);
    let mut cleaned = Vec::new();
    for word in plain.split_whitespace() {
        let word = word.to_lowercase();
        if options.drop_stop_words && is_stop_word(&word) {
            continue;
        }
        let word = if is_url(&word) {
            if options.remove_urls {
                continue;
            }
            URL_PLACEHOLDER.to_string()
        } else {
            word
        };
        if word.starts_with('@') {
            continue;
        }
        let word = collapse_repeats(&word.replace('#', ""));
        if !word.is_empty() {
            cleaned.push(word);
        }
    }
    cleaned.iter().flat_map(|word| word_tokens(word)).collect()
}

fn stop_words() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

fn is_stop_word(word: &str) -> bool {
    stop_words().contains(word)
}

fn is_url(word: &str) -> bool {
    let rest = word
        .strip_prefix("https://")
        .or_else(|| word.strip_prefix("http://"))
        .or_else(|| word.strip_prefix("www."));
    match rest {
        Some(rest) => rest.contains('.') || word.starts_with("www."),
        None => false,
    }
}

/// Remove `<...>` markup and decode the handful of entities posts commonly carry.
///
/// A `<` opens a tag only when a letter, `/` or `!` follows it and a later `>`
/// closes it, so text like `i <3 you` or `3 < 5` survives.
fn strip_html_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let opens_tag = after
            .chars()
            .next()
            .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '/' || ch == '!');
        match after.find('>') {
            Some(close) if opens_tag => {
                out.push(' ');
                rest = &after[close + 1..];
            }
            _ => {
                out.push('<');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Letters repeated three or more times collapse to one; repeated punctuation
/// collapses to a single character.
fn collapse_repeats(word: &str) -> String {
    let chars: Vec<char> = word.chars().collect();
    let mut out = String::with_capacity(word.len());
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == ch {
            run += 1;
        }
        let keep = if ch.is_ascii_alphabetic() {
            if run >= 3 { 1 } else { run }
        } else if is_collapsible_punct(ch) {
            1
        } else {
            run
        };
        for _ in 0..keep {
            out.push(ch);
        }
        i += run;
    }
    out
}

fn is_collapsible_punct(ch: char) -> bool {
    !(ch.is_alphanumeric() || ch == '_' || ch.is_whitespace() || ch == '\'' || ch == '`')
}

/// Maximal runs of word characters or apostrophes.
fn word_tokens(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == '\'' {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_stop_words_mentions_and_urls() {
        let tokens = tokenize(
            "I hate @someone and THIS http://example.com/page #angry",
            &CleaningOptions::default(),
        );
        assert_eq!(tokens, vec!["hate", "angry"]);
    }

    #[test]
    fn tokenize_can_keep_url_placeholder() {
        let options = CleaningOptions {
            remove_urls: false,
            drop_stop_words: true,
        };
        let tokens = tokenize("look www.example.org later", &options);
        assert_eq!(tokens, vec!["look", URL_PLACEHOLDER, "later"]);
    }

    #[test]
    fn tokenize_normalizes_repeated_characters() {
        let tokens = tokenize("sooooo cool!!! ok...", &CleaningOptions::default());
        assert_eq!(tokens, vec!["so", "cool", "ok"]);
        assert_eq!(collapse_repeats("goood"), "god");
        assert_eq!(collapse_repeats("good"), "good");
        assert_eq!(collapse_repeats("wait??!!"), "wait?!");
    }

    #[test]
    fn tokenize_strips_markup() {
        let tokens = tokenize("<p>angry&amp;<b>alone</b></p>", &CleaningOptions::default());
        assert_eq!(tokens, vec!["angry", "alone"]);
        assert_eq!(
            tokenize("<br>hello<!-- note -->world", &CleaningOptions::default()),
            vec!["hello", "world"]
        );
    }

    #[test]
    fn bare_angle_brackets_are_not_markup() {
        let options = CleaningOptions::default();
        let tokens = tokenize("i <3 my friends so much", &options);
        assert!(tokens.contains(&"3".to_string()), "{tokens:?}");
        assert!(tokens.contains(&"friends".to_string()), "{tokens:?}");

        let tokens = tokenize("score was 3 < 5 today angry", &options);
        assert_eq!(tokens, vec!["score", "3", "5", "today", "angry"]);

        assert_eq!(strip_html_tags("a <b unclosed"), "a <b unclosed");
    }

    #[test]
    fn tokenize_keeps_apostrophes_inside_words() {
        let tokens = tokenize("nobody'll care", &CleaningOptions::default());
        assert_eq!(tokens, vec!["nobody'll", "care"]);
    }

    #[test]
    fn text_of_only_stop_words_is_empty() {
        assert!(tokenize("the and of it", &CleaningOptions::default()).is_empty());
        assert!(tokenize("   ", &CleaningOptions::default()).is_empty());
    }
}
