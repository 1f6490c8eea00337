//! Benchmarks for text splitting strategies.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use chunkflow::{split, CustomRule, SplitConfig};

fn sample_text(size: usize) -> String {
    // Markdown-ish text: headings every few paragraphs, short lines.
    let lines = [
        "## Section heading\n",
        "The quick brown fox jumps over the lazy dog.\n",
        "Pack my box with five dozen liquor jugs.\n",
        "\n",
        "How vexingly quick daft zebras jump!\n",
        "### Subsection\n",
        "The five boxing wizards jump quickly.\n",
        "Sphinx of black quartz, judge my vow.\n",
    ];
    let mut text = String::with_capacity(size);
    let mut i = 0;
    while text.len() < size {
        text.push_str(lines[i % lines.len()]);
        i += 1;
    }
    text.truncate(size);
    text
}

fn bench_mode(c: &mut Criterion, group_name: &str, config: &SplitConfig) {
    let mut group = c.benchmark_group(group_name);

    for size in [1_000, 10_000, 100_000] {
        let text = sample_text(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new(group_name, size), &text, |b, text| {
            b.iter(|| split(black_box(text), config))
        });
    }

    group.finish();
}

fn bench_character(c: &mut Criterion) {
    bench_mode(c, "character", &SplitConfig::characters(500));
}

fn bench_line(c: &mut Criterion) {
    bench_mode(c, "line", &SplitConfig::lines(10).with_batch_size(2));
}

fn bench_heading(c: &mut Criterion) {
    bench_mode(
        c,
        "heading",
        &SplitConfig::custom(CustomRule::Heading { level: 2 }),
    );
}

fn bench_wildcard(c: &mut Criterion) {
    bench_mode(
        c,
        "wildcard",
        &SplitConfig::custom(CustomRule::marker("Sub*\n")),
    );
}

criterion_group!(
    benches,
    bench_character,
    bench_line,
    bench_heading,
    bench_wildcard
);
criterion_main!(benches);
