//! Performance benchmarks for the relay hot path
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::json;
use std::time::Duration;

use middletier_gateway::core::relay::{
    CorrelationTracker, MessageTranslator, ToolCallRecord, TurnSequencer,
    serialize_downstream_response, serialize_upstream_output,
};
use middletier_gateway::core::tools::ToolResult;

/// Benchmark classification of upstream frames
fn bench_frame_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_classification");
    group.measurement_time(Duration::from_secs(5));

    // Audio deltas dominate realtime traffic and must pass through untouched
    let audio_delta = format!(
        r#"{{"type":"response.audio.delta","response_id":"resp_1","item_id":"msg_1","delta":"{}"}}"#,
        "A".repeat(8_000)
    );

    let transcript_delta =
        r#"{"type":"response.audio_transcript.delta","response_id":"resp_1","delta":"Hello there"}"#;

    let tool_call = json!({
        "type": "response.output_item.done",
        "response_id": "resp_1",
        "item": {
            "id": "item_1",
            "type": "function_call",
            "call_id": "call_1",
            "name": "get_product_variants_by_category",
            "arguments": "{\"category\":\"SUV\"}"
        }
    })
    .to_string();

    let response_done = json!({
        "type": "response.done",
        "response": {
            "id": "resp_1",
            "status": "completed",
            "output": [
                { "id": "item_1", "type": "function_call", "call_id": "call_1" },
                { "id": "msg_1", "type": "message", "role": "assistant" }
            ]
        }
    })
    .to_string();

    for (name, frame) in [
        ("audio_delta", audio_delta.as_str()),
        ("transcript_delta", transcript_delta),
        ("tool_call", tool_call.as_str()),
        ("response_done", response_done.as_str()),
    ] {
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new(name, frame.len()), &frame, |b, frame| {
            let mut translator = MessageTranslator::new(true);
            b.iter(|| {
                let _ = translator.parse_upstream_frame(black_box(frame));
            });
        });
    }

    group.finish();
}

/// Benchmark encoding of tool results
fn bench_result_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_serialization");

    let record = ToolCallRecord::new("call_1", "resp_1", None)
        .with_tool_name("display_model_cards")
        .with_previous_item_id(Some("msg_0".to_string()));

    let cards: Vec<_> = (0..20)
        .map(|i| {
            json!({
                "title": format!("Model {i}"),
                "text": "Four doors, automatic",
                "image": format!("/images/model_{i}.png"),
            })
        })
        .collect();

    let upstream = ToolResult::to_upstream(json!({ "variants": cards }));
    let downstream = ToolResult::to_downstream(json!(cards));

    group.bench_function("to_upstream", |b| {
        b.iter(|| serialize_upstream_output(black_box(&upstream), &record, true));
    });
    group.bench_function("to_downstream_acknowledged", |b| {
        b.iter(|| {
            let response = serialize_downstream_response(black_box(&downstream), &record);
            let ack = serialize_upstream_output(black_box(&downstream), &record, true);
            (response, ack)
        });
    });
    group.bench_function("error", |b| {
        let error = ToolResult::error("Unknown tool: weather");
        b.iter(|| serialize_upstream_output(black_box(&error), &record, true));
    });

    group.finish();
}

/// Benchmark per-call bookkeeping
fn bench_call_bookkeeping(c: &mut Criterion) {
    let mut group = c.benchmark_group("call_bookkeeping");

    for calls in [1usize, 8, 32] {
        group.throughput(Throughput::Elements(calls as u64));
        group.bench_with_input(
            BenchmarkId::new("track_and_sequence", calls),
            &calls,
            |b, &calls| {
                b.iter(|| {
                    let tracker = CorrelationTracker::new();
                    let mut sequencer = TurnSequencer::new();
                    for i in 0..calls {
                        let record = tracker
                            .begin_record(ToolCallRecord::new(format!("call_{i}"), "resp_1", None))
                            .unwrap();
                        sequencer.open(record);
                    }
                    // Complete in reverse so every result waits on its predecessor
                    for i in (0..calls).rev() {
                        let call_id = format!("call_{i}");
                        let released = sequencer
                            .complete("resp_1", &call_id, ToolResult::to_upstream("ok"))
                            .unwrap();
                        for (record, _) in released.ordered {
                            tracker.complete(&record.call_id).unwrap();
                        }
                    }
                    sequencer.mark_response_done("resp_1");
                    black_box(tracker.live_count())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_classification,
    bench_result_serialization,
    bench_call_bookkeeping,
);
criterion_main!(benches);
