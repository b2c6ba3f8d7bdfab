//! Performance benchmarks for text splitting and frame codecs
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use edge_speech::core::tts::messages::{
    SpeechConfig, decode_binary_frame, decode_text_frame, encode_binary_frame, ssml_request,
};
use edge_speech::{Granularity, SmartSplit, SplitOptions, SsmlOptions, escape_xml, make_ssml};

fn sample_text() -> String {
    "It was the best of times, it was the worst of times. It was the age of wisdom & \
     the age of \"foolishness\"; it was the epoch of <belief>, it was the epoch of 'incredulity'. "
        .repeat(400)
}

/// Benchmark splitting at each granularity
fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");
    group.measurement_time(Duration::from_secs(5));

    let text = sample_text();
    let escaped = escape_xml(&text);

    for granularity in Granularity::ALL {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("plain", granularity),
            &text,
            |b, text| {
                b.iter(|| {
                    let options = SplitOptions::new(4096).unwrap().with_granularity(granularity);
                    SmartSplit::new([black_box(text.as_str())], options).count()
                });
            },
        );

        group.throughput(Throughput::Bytes(escaped.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("escaped", granularity),
            &escaped,
            |b, text| {
                b.iter(|| {
                    let options = SplitOptions::new(4096)
                        .unwrap()
                        .with_granularity(granularity)
                        .escaped(true);
                    SmartSplit::new([black_box(text.as_str())], options).count()
                });
            },
        );
    }

    group.finish();
}

/// Benchmark many small fragments, as produced by a streaming LLM
fn bench_split_fragments(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_fragments");

    let text = sample_text();
    let fragments: Vec<&str> = text.split_inclusive(' ').collect();
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("word_fragments", |b| {
        b.iter(|| {
            let options = SplitOptions::new(1024)
                .unwrap()
                .with_granularity(Granularity::Word);
            SmartSplit::new(black_box(&fragments).iter(), options).count()
        });
    });

    group.finish();
}

/// Benchmark request framing and response decoding
fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames");

    let chunk = escape_xml(&sample_text()[..4000]);
    let options = SsmlOptions::default();
    group.bench_function("ssml_request", |b| {
        b.iter(|| {
            let ssml = make_ssml(black_box(&chunk), &options);
            ssml_request(&ssml, "0123456789abcdef0123456789abcdef", "Thu Jan 01 1970")
        });
    });

    let config = SpeechConfig::default();
    group.bench_function("speech_config_json", |b| {
        b.iter(|| black_box(&config).to_json());
    });

    let text_frame = "X-RequestId:0123456789abcdef0123456789abcdef\r\n\
                      Content-Type:application/json; charset=utf-8\r\nPath:audio.metadata\r\n\r\n\
                      {\"Metadata\":[{\"Type\":\"WordBoundary\",\"Data\":{\"Offset\":1,\"Duration\":2,\
                      \"text\":{\"Text\":\"hello\",\"Length\":5,\"BoundaryType\":\"WordBoundary\"}}}]}";
    group.bench_function("decode_text_frame", |b| {
        b.iter(|| decode_text_frame(black_box(text_frame)).unwrap());
    });

    let binary_frame = encode_binary_frame(
        "X-RequestId:0123456789abcdef0123456789abcdef\r\nContent-Type:audio/mpeg\r\nPath:audio\r\n",
        &[0u8; 4096],
    )
    .unwrap();
    group.throughput(Throughput::Bytes(binary_frame.len() as u64));
    group.bench_function("decode_binary_frame", |b| {
        b.iter(|| decode_binary_frame(Bytes::clone(black_box(&binary_frame))).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_split, bench_split_fragments, bench_frames);
criterion_main!(benches);
