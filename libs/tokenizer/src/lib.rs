//! Keyword Tokenizer
//!
//! Splits English text into word and punctuation tokens and flags stop words.
//!
//! A [`Tokenizer`] is built explicitly with [`Tokenizer::english`] and passed to
//! whoever needs it. Construction builds the stop-word set (a few hundred entries),
//! so build one per parser and share it rather than creating one per message.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:'[\p{L}]+)*|[^\s\p{L}\p{N}]").expect("token regex is valid")
});

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all",
    "almost", "alone", "along", "already", "also", "although", "always", "am", "among",
    "amongst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything",
    "anyway", "anywhere", "are", "around", "as", "at", "back", "be", "became", "because",
    "become", "becomes", "becoming", "been", "before", "beforehand", "behind", "being",
    "below", "beside", "besides", "between", "beyond", "both", "bottom", "but", "by",
    "ca", "call", "can", "cannot", "could", "did", "do", "does", "doing", "done", "down",
    "due", "during", "each", "eight", "either", "eleven", "else", "elsewhere", "empty",
    "enough", "even", "ever", "every", "everyone", "everything", "everywhere", "except",
    "few", "fifteen", "fifty", "first", "five", "for", "former", "formerly", "forty",
    "four", "from", "front", "full", "further", "get", "give", "go", "had", "has", "have",
    "he", "hence", "her", "here", "hereafter", "hereby", "herein", "hereupon", "hers",
    "herself", "him", "himself", "his", "how", "however", "hundred", "i", "if", "in",
    "indeed", "into", "is", "it", "its", "itself", "just", "keep", "last", "latter",
    "latterly", "least", "less", "made", "make", "many", "may", "me", "meanwhile",
    "might", "mine", "more", "moreover", "most", "mostly", "move", "much", "must", "my",
    "myself", "name", "namely", "neither", "never", "nevertheless", "next", "nine", "no",
    "nobody", "none", "noone", "nor", "not", "nothing", "now", "nowhere", "of", "off",
    "often", "on", "once", "one", "only", "onto", "or", "other", "others", "otherwise",
    "our", "ours", "ourselves", "out", "over", "own", "part", "per", "perhaps", "please",
    "put", "quite", "rather", "re", "really", "regarding", "same", "say", "see", "seem",
    "seemed", "seeming", "seems", "serious", "several", "she", "should", "show", "side",
    "since", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "third", "this", "those",
    "though", "three", "through", "throughout", "thru", "thus", "to", "together", "too",
    "top", "toward", "towards", "twelve", "twenty", "two", "under", "unless", "until",
    "up", "upon", "us", "used", "using", "various", "very", "via", "was", "we", "well",
    "were", "what", "whatever", "when", "whence", "whenever", "where", "whereafter",
    "whereas", "whereby", "wherein", "whereupon", "wherever", "whether", "which", "while",
    "whither", "who", "whoever", "whole", "whom", "whose", "why", "will", "with", "within",
    "without", "would", "yet", "you", "your", "yours", "yourself", "yourselves", "'d",
    "'ll", "'m", "'re", "'s", "'ve", "n't",
];

/// One token of the input text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub is_stop: bool,
    pub is_punct: bool,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    stop_words: HashSet<&'static str>,
}

impl Tokenizer {
    /// Build an English tokenizer with the default stop-word list
    pub fn english() -> Self {
        Self::with_stop_words(ENGLISH_STOP_WORDS.iter().copied())
    }

    pub fn with_stop_words(words: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            stop_words: words.into_iter().collect(),
        }
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word) || self.stop_words.contains(word.to_lowercase().as_str())
    }

    pub fn tokenize<'a>(&self, text: &'a str) -> Vec<Token<'a>> {
        TOKEN_RE
            .find_iter(text)
            .map(|m| {
                let text = m.as_str();
                let is_punct = !text.chars().any(char::is_alphanumeric);
                Token {
                    text,
                    is_stop: !is_punct && self.is_stop_word(text),
                    is_punct,
                }
            })
            .collect()
    }

    /// Tokens that are neither stop words nor punctuation
    pub fn content_words<'a>(&self, text: &'a str) -> impl Iterator<Item = &'a str> {
        self.tokenize(text)
            .into_iter()
            .filter(|t| !t.is_stop && !t.is_punct)
            .map(|t| t.text)
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::english()
    }
}
