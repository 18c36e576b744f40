use crate::NormalizeError;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{BTreeSet, HashSet};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Inputs above this size are rejected rather than normalized.
pub const MAX_TEXT_BYTES: usize = 1 << 20;

/// Longest contraction suffix (apostrophe included) that gets cut off: 's, 'll, 've, n't.
const MAX_CONTRACTION_LEN: usize = 3;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// NFKD, drop combining marks (café -> cafe), lowercase.
fn fold(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase()
}

/// Strip a short contraction suffix: runner's -> runner, we'll -> we.
fn strip_contraction(token: &str) -> &str {
    match token.find('\'') {
        Some(i) if token.len() - i <= MAX_CONTRACTION_LEN => &token[..i],
        Some(i) => match token[i + 1..].find('\'') {
            Some(j) => &token[..i + 1 + j],
            None => token,
        },
        None => token,
    }
}

fn normalize_token(token: &str) -> Option<String> {
    if is_stopword(token) { return None; }
    let token = strip_contraction(token).trim_end_matches('\'');
    if token.is_empty() || is_stopword(token) { return None; }
    Some(STEMMER.stem(token).into_owned())
}

/// Tokenize text into (term, position) pairs: diacritic folding, lowercase, stopword removal, stemming.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    let normalized = fold(text);
    let mut tokens = Vec::new();
    for (pos, mat) in RE.find_iter(&normalized).enumerate() {
        if let Some(stem) = normalize_token(mat.as_str()) {
            tokens.push((stem, pos));
        }
    }
    tokens
}

/// Deterministic keyword set for a piece of text. Used both when storing comics and when
/// normalizing a search phrase, so the two always agree.
pub fn keywords(text: &str) -> Result<BTreeSet<String>, NormalizeError> {
    if text.len() > MAX_TEXT_BYTES {
        return Err(NormalizeError::TooLong { len: text.len(), max: MAX_TEXT_BYTES });
    }
    Ok(tokenize(text).into_iter().map(|(w, _)| w).collect())
}
