use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vexrender::api::MockProvider;
use vexrender::config::RenderConfig;
use vexrender::markdown::EngineCache;
use vexrender::state::{Segment, SegmentKind, SegmentTracker};
use vexrender::stream::{process_stream, MAX_TEXT_EVENT_BYTES};
use vexrender::ui::ansi::strip_ansi;
use vexrender::ui::render::{markdown_render_fn, plain_render_fn, RenderFn};

fn data(json: &str) -> String {
    format!("data: {json}")
}

fn text_event(text: &str) -> String {
    data(&serde_json::json!({ "type": "text_delta", "text": text }).to_string())
}

struct Run {
    printed: String,
    single_pass: String,
    tracker: SegmentTracker,
}

/// Drive one scripted response through the adapter and tracker, flushing
/// after every event the way the CLI loop does.
async fn run(chunks: Vec<String>, width: usize) -> Run {
    let engines = Arc::new(EngineCache::default());
    let render: Box<RenderFn> = if width == 0 {
        plain_render_fn()
    } else {
        markdown_render_fn(engines.get(width))
    };
    let mut tracker = SegmentTracker::new(&RenderConfig::default(), engines);
    let provider = MockProvider::new(vec![chunks]);
    let stream = provider.next_stream().expect("scripted response");
    let mut rx = process_stream(CancellationToken::new(), stream, 2);

    let mut printed = String::new();
    let mut print = |chunk: String| {
        if !chunk.is_empty() {
            printed.push_str(&chunk);
            printed.push('\n');
        }
    };

    while let Some(event) = rx.recv().await {
        if tracker.apply_event(event, width) {
            break;
        }
        print(tracker.flush_streaming_text(width));
        print(tracker.flush_to_scrollback(width, 0, 1, render.as_ref()));
    }
    tracker.finish_turn(render.as_ref());
    print(tracker.flush_to_scrollback(width, 0, 0, render.as_ref()));

    let single_pass = tracker.render_all(width, render.as_ref());
    Run {
        printed,
        single_pass,
        tracker,
    }
}

fn assert_equivalent(run: &Run) {
    let mut expected = strip_ansi(&run.single_pass);
    if !expected.ends_with('\n') {
        expected.push('\n');
    }
    assert_eq!(strip_ansi(&run.printed), expected);
    assert!(!run.tracker.has_unflushed());
}

#[tokio::test]
async fn test_hello_prints_once_with_trailing_blank_line() {
    let run = run(vec![text_event("Hello")], 80).await;
    assert_eq!(strip_ansi(&run.printed), "Hello\n\n");
    assert_equivalent(&run);
}

#[tokio::test]
async fn test_mixed_turn_matches_single_pass_render() {
    let chunks = vec![
        text_event("I'll check the build first.\n\n"),
        text_event("Running the **tests** now"),
        data(r#"{"type":"tool_call_start","id":"call_1","name":"bash","info":"cargo test"}"#),
        data(r#"{"type":"phase","label":"Waiting for tool"}"#),
        data(r#"{"type":"tool_call_end","id":"call_1","name":"bash","success":false}"#),
        data(r#"{"type":"tool_call_start","id":"call_2","name":"read","info":"src/lib.rs"}"#),
        data(r#"{"type":"tool_call_end","id":"call_2","name":"read"}"#),
        text_event("Two tests fail:\n\n- `parse_empty`\n- `parse_nested`\n\n"),
        text_event("| test | status |\n|---|---|\n| parse_empty | fail |\n\n"),
        text_event("Fixing them next."),
        data(r#"{"type":"usage","input_tokens":100,"output_tokens":40}"#),
    ];
    let run = run(chunks, 80).await;
    assert_equivalent(&run);

    let printed = strip_ansi(&run.printed);
    assert_eq!(printed.matches("I'll check the build first.").count(), 1);
    assert_eq!(printed.matches("Fixing them next.").count(), 1);
    assert!(printed.contains("✗ bash cargo test\n✓ read src/lib.rs\n\nTwo tests fail:"));
    assert!(!printed.contains("Waiting for tool"));
    assert_eq!(run.tracker.usage().output_tokens, 40);
}

#[tokio::test]
async fn test_tool_only_turn_has_no_placeholder() {
    let chunks = vec![
        data(r#"{"type":"tool_call_start","id":"call_1","name":"bash","info":"ls"}"#),
        data(r#"{"type":"tool_call_end","id":"call_1","name":"bash"}"#),
    ];
    let run = run(chunks, 80).await;
    assert_equivalent(&run);
    assert_eq!(strip_ansi(&run.printed), "✓ bash ls\n");
    assert!(!run.printed.contains("(no response)"));
}

#[tokio::test]
async fn test_boundary_sized_response_has_no_placeholder() {
    let text = "z".repeat(MAX_TEXT_EVENT_BYTES);
    let run = run(vec![text_event(&text)], 0).await;
    assert_equivalent(&run);
    assert_eq!(run.tracker.len(), 1);
    assert_eq!(run.tracker.segments()[0].kind(), SegmentKind::Text);
    match &run.tracker.segments()[0] {
        Segment::Text(segment) => assert_eq!(segment.raw().len(), MAX_TEXT_EVENT_BYTES),
        other => panic!("unexpected segment {other:?}"),
    }
    assert!(!run.printed.contains("(no response)"));
}

#[tokio::test]
async fn test_empty_response_gets_placeholder() {
    let run = run(
        vec![data(r#"{"type":"usage","input_tokens":3,"output_tokens":0}"#)],
        80,
    )
    .await;
    assert_equivalent(&run);
    assert_eq!(strip_ansi(&run.printed), "(no response)\n");
}

#[tokio::test]
async fn test_error_mid_stream_keeps_partial_text() {
    let chunks = vec![
        text_event("Partial answer before the failure.\n\nSecond"),
        data(r#"{"type":"error","message":"connection dropped"}"#),
    ];
    let run = run(chunks, 80).await;
    assert_equivalent(&run);
    let printed = strip_ansi(&run.printed);
    assert!(printed.starts_with("Partial answer before the failure.\n\nSecond\n\n"));
    assert!(printed.ends_with("Error: Transport error: connection dropped\n"));
}

#[tokio::test]
async fn test_plain_mode_matches_single_pass_render() {
    let chunks = vec![
        text_event("plain **markdown** stays raw"),
        data(r#"{"type":"tool_call_start","id":"call_1","name":"grep","info":"TODO"}"#),
        data(r#"{"type":"tool_call_end","id":"call_1","name":"grep"}"#),
        text_event("done"),
    ];
    let run = run(chunks, 0).await;
    assert_equivalent(&run);
    assert_eq!(
        strip_ansi(&run.printed),
        "plain **markdown** stays raw\n\n✓ grep TODO\n\ndone\n\n"
    );
}
