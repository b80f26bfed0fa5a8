use super::cps;
use crate::dict::DynamicDictionary;

fn sample_dict() -> DynamicDictionary {
    let mut dict = DynamicDictionary::new();
    dict.add_word(&cps("the"), 200).unwrap();
    dict.add_word(&cps("quick"), 50).unwrap();
    dict.add_word(&cps("brown"), 50).unwrap();
    dict
}

fn pos_of(dict: &DynamicDictionary, word: &str) -> u32 {
    dict.find_word(&cps(word), false).unwrap().unwrap()
}

#[test]
fn test_bigram_boosts_probability() {
    let mut dict = sample_dict();
    assert!(dict.add_bigram(&cps("the"), &cps("quick"), 60).unwrap());
    let the = pos_of(&dict, "the");
    let quick = pos_of(&dict, "quick");
    let brown = pos_of(&dict, "brown");

    // 60 + boost(32) = 92, above the unigram 50.
    assert_eq!(dict.probability_between(the, quick).unwrap(), Some(92));
    // No bigram: the unigram probability stands.
    assert_eq!(dict.probability_between(the, brown).unwrap(), Some(50));
    assert_eq!(dict.bigram_count(), 1);
}

#[test]
fn test_bigram_blend_bounds() {
    let dict = sample_dict();
    assert_eq!(dict.probability(100, None), 100);
    // Boost saturates at the probability ceiling.
    assert_eq!(dict.probability(10, Some(250)), 255);
    // A weak bigram never demotes a strong unigram.
    assert_eq!(dict.probability(200, Some(5)), 200);
}

#[test]
fn test_bigram_requires_both_words() {
    let mut dict = sample_dict();
    assert!(!dict.add_bigram(&cps("the"), &cps("missing"), 60).unwrap());
    assert!(!dict.add_bigram(&cps("missing"), &cps("the"), 60).unwrap());
    assert_eq!(dict.bigram_count(), 0);
}

#[test]
fn test_bigram_update_and_remove() {
    let mut dict = sample_dict();
    dict.add_bigram(&cps("the"), &cps("quick"), 60).unwrap();
    dict.add_bigram(&cps("the"), &cps("brown"), 70).unwrap();
    // Update keeps the count.
    dict.add_bigram(&cps("the"), &cps("quick"), 65).unwrap();
    assert_eq!(dict.bigram_count(), 2);

    assert!(dict.remove_bigram(&cps("the"), &cps("quick")).unwrap());
    assert!(!dict.remove_bigram(&cps("the"), &cps("quick")).unwrap());
    assert_eq!(dict.bigram_count(), 1);

    let the = pos_of(&dict, "the");
    let quick = pos_of(&dict, "quick");
    assert_eq!(dict.probability_between(the, quick).unwrap(), Some(50));

    let mut live = Vec::new();
    dict.iterate_bigrams(the, |target, p| live.push((target, p)))
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].1, 70);
}

#[test]
fn test_bigram_survives_node_relocation() {
    let mut dict = DynamicDictionary::new();
    dict.add_word(&cps("cart"), 110).unwrap();
    dict.add_word(&cps("dog"), 90).unwrap();
    dict.add_bigram(&cps("dog"), &cps("cart"), 60).unwrap();
    // Splitting the "cart" edge relocates its node record.
    dict.add_word(&cps("car"), 100).unwrap();
    let dog = pos_of(&dict, "dog");
    let cart = pos_of(&dict, "cart");
    assert_eq!(dict.probability_between(dog, cart).unwrap(), Some(92));
}

#[test]
fn test_removed_context_word_silences_its_bigrams() {
    let mut dict = sample_dict();
    dict.add_bigram(&cps("the"), &cps("quick"), 60).unwrap();
    let the = pos_of(&dict, "the");
    let quick = pos_of(&dict, "quick");
    dict.remove_word(&cps("the")).unwrap();
    assert_eq!(dict.probability_between(the, quick).unwrap(), None);
}

#[test]
fn test_word_property_hides_removed_bigram_targets() {
    let mut dict = sample_dict();
    dict.add_bigram(&cps("the"), &cps("quick"), 60).unwrap();
    dict.add_bigram(&cps("the"), &cps("brown"), 70).unwrap();
    dict.remove_word(&cps("quick")).unwrap();

    // The bigram entry still sits in the buffer until GC, but a tombstoned
    // target must not be reported as a live successor.
    let p = dict.word_property(&cps("the")).unwrap().unwrap();
    assert_eq!(p.bigrams, vec![(cps("brown"), 70)]);

    dict.run_gc().unwrap();
    let p = dict.word_property(&cps("the")).unwrap().unwrap();
    assert_eq!(p.bigrams, vec![(cps("brown"), 70)]);
}

#[test]
fn test_shortcut_lifecycle() {
    let mut dict = sample_dict();
    assert!(dict
        .add_shortcut(&cps("the"), &cps("teh"), 15, false)
        .unwrap());
    assert!(dict
        .add_shortcut(&cps("the"), &cps("hte"), 15, true)
        .unwrap());
    // Updating an existing spelling flips its whitelist bit in place.
    assert!(dict
        .add_shortcut(&cps("the"), &cps("teh"), 20, true)
        .unwrap());
    // Unknown word: nothing to attach to.
    assert!(!dict
        .add_shortcut(&cps("missing"), &cps("mising"), 15, false)
        .unwrap());

    let p = dict.word_property(&cps("the")).unwrap().unwrap();
    assert_eq!(
        p.shortcuts,
        vec![(cps("teh"), 20, true), (cps("hte"), 15, true)]
    );

    assert!(dict.remove_shortcut(&cps("the"), &cps("teh")).unwrap());
    assert!(!dict.remove_shortcut(&cps("the"), &cps("teh")).unwrap());
    let p = dict.word_property(&cps("the")).unwrap().unwrap();
    assert_eq!(p.shortcuts, vec![(cps("hte"), 15, true)]);
}
