use std::collections::BTreeSet;

use super::cps;
use crate::dict::{DictError, DynamicDictionary};

fn sample_words() -> Vec<&'static str> {
    vec!["cat", "car", "cart", "dog", "do", "done", "ant"]
}

fn sample_dict() -> DynamicDictionary {
    let mut dict = DynamicDictionary::new();
    for word in sample_words() {
        dict.add_word(&cps(word), 50).unwrap();
    }
    dict
}

fn drain(dict: &mut DynamicDictionary, mut token: u64) -> Vec<Vec<u32>> {
    let mut words = Vec::new();
    while let Some((word, next)) = dict.next_word(token).unwrap() {
        words.push(word);
        token = next;
    }
    words
}

#[test]
fn test_iteration_visits_every_word_once() {
    let mut dict = sample_dict();
    let words = drain(&mut dict, 0);
    assert_eq!(words.len(), sample_words().len());
    let seen: BTreeSet<Vec<u32>> = words.into_iter().collect();
    let expected: BTreeSet<Vec<u32>> = sample_words().iter().map(|w| cps(w)).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_iteration_skips_tombstones() {
    let mut dict = sample_dict();
    dict.remove_word(&cps("dog")).unwrap();
    dict.remove_word(&cps("cart")).unwrap();
    let words = drain(&mut dict, 0);
    assert_eq!(words.len(), sample_words().len() - 2);
    assert!(!words.contains(&cps("dog")));
    assert!(!words.contains(&cps("cart")));
}

#[test]
fn test_iteration_is_resumable() {
    let mut dict = sample_dict();
    let (first, token) = dict.next_word(0).unwrap().unwrap();
    let (second, token) = dict.next_word(token).unwrap().unwrap();
    assert_ne!(first, second);
    let rest = drain(&mut dict, token);
    assert_eq!(rest.len(), sample_words().len() - 2);
    assert!(!rest.contains(&first));
    assert!(!rest.contains(&second));
}

#[test]
fn test_mutation_invalidates_tokens() {
    let mut dict = sample_dict();
    let (_, token) = dict.next_word(0).unwrap().unwrap();
    dict.add_word(&cps("new"), 60).unwrap();
    assert!(matches!(
        dict.next_word(token),
        Err(DictError::StaleToken)
    ));
    // Restarting from scratch works and sees the new word.
    let words = drain(&mut dict, 0);
    assert_eq!(words.len(), sample_words().len() + 1);
}

#[test]
fn test_gc_invalidates_tokens() {
    let mut dict = sample_dict();
    let (_, token) = dict.next_word(0).unwrap().unwrap();
    dict.run_gc().unwrap();
    assert!(matches!(
        dict.next_word(token),
        Err(DictError::StaleToken)
    ));
    assert_eq!(drain(&mut dict, 0).len(), sample_words().len());
}

#[test]
fn test_empty_dictionary_iterates_to_nothing() {
    let mut dict = DynamicDictionary::new();
    assert!(dict.next_word(0).unwrap().is_none());
}
