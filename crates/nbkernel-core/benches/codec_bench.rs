//! Criterion benchmarks for the JSON codec and envelope signing.
//!
//! Run with:
//! ```bash
//! cargo bench --package nbkernel-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nbkernel_core::protocol::codec::{decode, encode};
use nbkernel_core::protocol::header::MessageHeader;
use nbkernel_core::protocol::messages::{
    Content, Display, ExecuteReply, ExecuteResult, ExecuteStatus, ExecutionState, Message,
    Status, Stream, StreamName,
};
use nbkernel_core::protocol::mime::{DisplayData, ImageSize, MimeType};
use nbkernel_core::{Envelope, MessageType, Session, Signer};
use serde_json::Map;

// ── Message fixtures ──────────────────────────────────────────────────────────

fn reply_to(content: Content) -> Message {
    let session = Session::new("bench");
    let mut request = MessageHeader::new(MessageType::ExecuteRequest, &session);
    request.identities = vec![b"frontend".to_vec()];
    Message::child_of(&request, content, &session)
}

fn make_status() -> Message {
    reply_to(Content::Status(Status {
        execution_state: ExecutionState::Busy,
    }))
}

fn make_stream() -> Message {
    reply_to(Content::Stream(Stream {
        name: StreamName::Stdout,
        text: "line of output\n".repeat(20),
    }))
}

fn make_execute_result() -> Message {
    reply_to(Content::ExecuteResult(ExecuteResult {
        execution_count: 42,
        data: vec![
            DisplayData::plain("2"),
            DisplayData::new(MimeType::Html, "<pre>2</pre>"),
        ],
    }))
}

fn make_display_png() -> Message {
    reply_to(Content::DisplayData(Display {
        data: vec![
            DisplayData::new(MimeType::Png(ImageSize::new(640, 480)), "A".repeat(16 * 1024)),
            DisplayData::plain("<Figure>"),
        ],
        display_id: Some("fig-1".to_string()),
    }))
}

fn make_execute_reply() -> Message {
    reply_to(Content::ExecuteReply(ExecuteReply {
        status: ExecuteStatus::Ok,
        execution_count: 42,
        pager: Vec::new(),
        user_expressions: Map::new(),
        error: None,
    }))
}

fn fixtures() -> Vec<(&'static str, Message)> {
    vec![
        ("status", make_status()),
        ("stream", make_stream()),
        ("execute_result", make_execute_result()),
        ("display_data_png_16k", make_display_png()),
        ("execute_reply", make_execute_reply()),
    ]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for (name, msg) in fixtures() {
        group.bench_with_input(BenchmarkId::new("msg", name), &msg, |b, msg| {
            b.iter(|| encode(black_box(msg)).expect("encode must succeed"))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for (name, msg) in fixtures() {
        let parts = encode(&msg).expect("encode must succeed");
        group.bench_with_input(BenchmarkId::new("msg", name), &parts, |b, parts| {
            b.iter(|| {
                decode(
                    Vec::new(),
                    black_box(&parts.header),
                    black_box(&parts.parent_header),
                    black_box(&parts.metadata),
                    black_box(&parts.content),
                )
                .expect("decode must succeed")
            })
        });
    }
    group.finish();
}

fn bench_signed_envelope(c: &mut Criterion) {
    let signer = Signer::new(b"bench-key-0123456789").expect("key accepted");
    let mut group = c.benchmark_group("signed_envelope");

    let msg = make_execute_result();
    group.bench_function("seal", |b| {
        b.iter(|| Envelope::from_message(black_box(&msg), &signer).expect("seal"))
    });

    let frames = Envelope::from_message(&msg, &signer)
        .expect("seal")
        .into_frames();
    group.bench_function("open", |b| {
        b.iter(|| Envelope::open(black_box(frames.clone()), &signer).expect("open"))
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_signed_envelope);
criterion_main!(benches);
