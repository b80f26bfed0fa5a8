use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dyndict::dict::DynamicDictionary;

fn cps(s: &str) -> Vec<u32> {
    s.chars().map(|c| c as u32).collect()
}

/// A dictionary with heavy prefix sharing, the shape user dictionaries take.
fn bench_dict(word_count: u32) -> DynamicDictionary {
    let stems = ["work", "play", "read", "write", "run", "walk", "talk", "think"];
    let suffixes = ["", "s", "ed", "ing", "er", "ers", "able", "ably"];
    let mut dict = DynamicDictionary::new();
    let mut added = 0u32;
    'outer: for i in 0.. {
        for stem in stems {
            for suffix in suffixes {
                let word = format!("{stem}{i}{suffix}");
                dict.add_word(&cps(&word), 50).unwrap();
                added += 1;
                if added >= word_count {
                    break 'outer;
                }
            }
        }
    }
    dict
}

static SIZES: &[u32] = &[100, 1000, 5000];

fn bench_find_word(c: &mut Criterion) {
    let mut group = c.benchmark_group("dict/find_word");
    for &size in SIZES {
        let dict = bench_dict(size);
        let hit = cps("work0ing");
        let miss = cps("work0ingly");
        group.bench_with_input(BenchmarkId::new("hit", size), &dict, |b, dict| {
            b.iter(|| dict.find_word(&hit, false).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("miss", size), &dict, |b, dict| {
            b.iter(|| dict.find_word(&miss, false).unwrap());
        });
    }
    group.finish();
}

fn bench_add_word(c: &mut Criterion) {
    let mut group = c.benchmark_group("dict/add_word");
    for &size in SIZES {
        let dict = bench_dict(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &dict, |b, dict| {
            let mut i = 0u32;
            b.iter_batched(
                || dict.to_bytes().unwrap(),
                |bytes| {
                    let mut d = DynamicDictionary::from_bytes(&bytes).unwrap();
                    i += 1;
                    d.add_word(&cps(&format!("fresh{i}")), 60).unwrap()
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_gc(c: &mut Criterion) {
    let mut group = c.benchmark_group("dict/gc");
    group.sample_size(20);
    for &size in SIZES {
        let mut dirty = bench_dict(size);
        let mut token = 0u64;
        let mut victims = Vec::new();
        while let Some((word, next)) = dirty.next_word(token).unwrap() {
            if victims.len() < size as usize / 2 {
                victims.push(word);
            }
            token = next;
        }
        for word in &victims {
            dirty.remove_word(word).unwrap();
        }
        let bytes = dirty.to_bytes().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter_batched(
                || DynamicDictionary::from_bytes(bytes).unwrap(),
                |mut d| d.run_gc().unwrap(),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_find_word, bench_add_word, bench_gc);
criterion_main!(benches);
