use comics_core::tokenizer::{keywords, tokenize};

fn words(text: &str) -> Vec<String> {
    tokenize(text).into_iter().map(|(w, _)| w).collect()
}

#[test]
fn it_folds_case_accents_and_stems() {
    let w = words("Running Runners RUN! The café's menu.");
    assert!(w.contains(&"run".to_string()));
    // café's -> cafe
    assert!(w.contains(&"cafe".to_string()));
    assert!(w.iter().all(|t| t.chars().all(|c| !c.is_uppercase())));
}

#[test]
fn positions_skip_stopwords() {
    let toks = tokenize("The bobcat and the velociraptor");
    assert_eq!(toks, vec![("bobcat".to_string(), 1), ("velociraptor".to_string(), 4)]);
}

#[test]
fn keywords_are_deduplicated_and_deterministic() {
    let text = "Sorting sorted sorts, and/or binary-search trees";
    let a = keywords(text).unwrap();
    let b = keywords(text).unwrap();
    assert_eq!(a, b);
    assert!(a.contains("sort"));
    assert_eq!(a.iter().filter(|w| *w == "sort").count(), 1);
    // composite words split on '/'
    assert!(!a.iter().any(|w| w.contains('/')));
}

#[test]
fn punctuation_and_brackets_are_ignored() {
    let a = keywords("[[Megan looks at the {laptop}]] \"Hmm?!\"").unwrap();
    assert!(a.contains("megan"));
    assert!(a.contains("laptop"));
    assert!(a.iter().all(|w| w.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '\'')));
}

#[test]
fn empty_text_has_no_keywords() {
    assert!(keywords("").unwrap().is_empty());
    assert!(keywords("the and of").unwrap().is_empty());
}
