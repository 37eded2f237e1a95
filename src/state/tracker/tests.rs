use super::core::NO_RESPONSE_PLACEHOLDER;
use super::*;
use crate::config::RenderConfig;
use crate::markdown::EngineCache;
use crate::state::segment::{Segment, SegmentKind, ToolStatus};
use crate::state::subagent::{SubagentEvent, SubagentRegistry};
use crate::state::wave::WavePosition;
use crate::stream::{StreamEvent, Usage};
use crate::test_support::plain;
use crate::types::ProviderError;
use crate::ui::render::{markdown_render_fn, plain_render_fn, RenderFn};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const WIDTH: usize = 80;

/// Collects what a caller would print: every non-empty flush followed by a
/// newline.
#[derive(Default)]
struct Scrollback {
    printed: String,
}

impl Scrollback {
    fn print(&mut self, chunk: String) {
        if !chunk.is_empty() {
            self.printed.push_str(&chunk);
            self.printed.push('\n');
        }
    }
}

fn expected_print(render_all: &str) -> String {
    if render_all.ends_with('\n') {
        render_all.to_string()
    } else {
        format!("{render_all}\n")
    }
}

fn markdown_tracker() -> (SegmentTracker, Box<RenderFn>) {
    let engines = Arc::new(EngineCache::default());
    let render = markdown_render_fn(engines.get(WIDTH));
    (SegmentTracker::new(&RenderConfig::default(), engines), render)
}

#[test]
fn test_tracker_module_structure() {
    let _ = std::any::TypeId::of::<SegmentTracker>();

    assert!(Path::new("src/state/tracker/state.rs").exists());
    assert!(Path::new("src/state/tracker/core.rs").exists());
    assert!(Path::new("src/state/tracker/flush.rs").exists());
}

#[test]
fn test_add_text_appends_to_open_segment() {
    let mut tracker = SegmentTracker::default();
    tracker.add_text("Hel", 0);
    tracker.add_text("lo", 0);
    tracker.add_text("", 0);
    assert_eq!(tracker.len(), 1);
    match &tracker.segments()[0] {
        Segment::Text(text) => {
            assert_eq!(text.raw(), "Hello");
            assert!(!text.is_complete());
        }
        other => panic!("unexpected segment {other:?}"),
    }
}

#[test]
fn test_tool_start_completes_open_text() {
    let mut tracker = SegmentTracker::default();
    tracker.add_text("Let me look.", 0);
    assert!(tracker.handle_tool_start("call_1", "read", "src/lib.rs", "{}"));
    assert_eq!(tracker.len(), 2);
    assert!(tracker.segments()[0].is_complete());
    assert!(!tracker.segments()[1].is_complete());

    tracker.add_text("More", 0);
    assert_eq!(tracker.len(), 3);
    assert_eq!(tracker.segments()[2].kind(), SegmentKind::Text);
}

#[test]
fn test_duplicate_tool_start_is_ignored_while_pending() {
    let mut tracker = SegmentTracker::default();
    assert!(tracker.handle_tool_start("call_1", "bash", "ls", ""));
    assert!(!tracker.handle_tool_start("call_1", "bash", "ls", ""));
    assert_eq!(tracker.len(), 1);
}

#[test]
fn test_tool_end_for_unknown_id_is_a_no_op() {
    let mut tracker = SegmentTracker::default();
    tracker.handle_tool_start("call_1", "bash", "ls", "");
    assert!(!tracker.handle_tool_end("call_2", true));
    assert!(!tracker.segments()[0].is_complete());
    assert!(tracker.handle_tool_end("call_1", false));
    match &tracker.segments()[0] {
        Segment::Tool(tool) => assert_eq!(tool.status, ToolStatus::Error),
        other => panic!("unexpected segment {other:?}"),
    }
    assert!(!tracker.handle_tool_end("call_1", true));
}

#[test]
fn test_plain_mode_hello_round_trip() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    tracker.add_text("Hello", 0);
    tracker.finish_turn(render.as_ref());

    let full = tracker.render_all(0, render.as_ref());
    assert_eq!(full, "Hello\n\n");

    let mut scrollback = Scrollback::default();
    scrollback.print(tracker.flush_to_scrollback(0, 0, 0, render.as_ref()));
    assert_eq!(scrollback.printed, "Hello\n\n");
    assert!(!tracker.has_unflushed());
}

#[test]
fn test_tool_only_turn_has_no_placeholder() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    tracker.handle_tool_start("call_1", "bash", "ls", "");
    tracker.handle_tool_end("call_1", true);
    tracker.finish_turn(render.as_ref());
    assert_eq!(tracker.len(), 1);

    let out = tracker.flush_to_scrollback(0, 0, 0, render.as_ref());
    assert_eq!(plain(&out), "✓ bash ls");
    assert!(!plain(&out).contains(NO_RESPONSE_PLACEHOLDER));
}

#[test]
fn test_empty_turn_gets_placeholder() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    tracker.add_text("  \n", 0);
    tracker.finish_turn(render.as_ref());
    let full = tracker.render_all(0, render.as_ref());
    assert_eq!(plain(&full), NO_RESPONSE_PLACEHOLDER);
}

#[test]
fn test_flush_stops_at_first_incomplete_segment() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    tracker.add_text("Intro", 0);
    tracker.handle_tool_start("call_1", "read", "a.rs", "");
    tracker.handle_tool_start("call_2", "read", "b.rs", "");
    tracker.handle_tool_end("call_2", true);

    let out = tracker.flush_to_scrollback(0, 0, 0, render.as_ref());
    assert_eq!(out, "Intro\n");
    assert_eq!(tracker.flushed_count(), 1);
    assert!(tracker.segments()[0].is_flushed());
    assert!(!tracker.segments()[2].is_flushed());

    tracker.handle_tool_end("call_1", true);
    let out = tracker.flush_to_scrollback(0, 0, 0, render.as_ref());
    assert_eq!(plain(&out), "✓ read a.rs\n✓ read b.rs");
    assert_eq!(tracker.flushed_count(), 3);
}

#[test]
fn test_min_keep_holds_back_tail_segments() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    tracker.add_text("Intro", 0);
    tracker.add_plain_result("result");
    assert_eq!(tracker.flush_to_scrollback(0, 0, 2, render.as_ref()), "");
    assert_eq!(tracker.flushed_count(), 0);
    assert_eq!(tracker.flush_to_scrollback(0, 0, 1, render.as_ref()), "Intro\n");
    assert_eq!(tracker.flushed_count(), 1);
}

#[test]
fn test_incremental_flushes_match_single_pass_render() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    let mut scrollback = Scrollback::default();

    tracker.add_text("Intro", 0);
    tracker.handle_tool_start("call_1", "read", "a.rs", "");
    scrollback.print(tracker.flush_to_scrollback(0, 0, 1, render.as_ref()));
    tracker.handle_tool_end("call_1", true);
    tracker.handle_tool_start("call_2", "grep", "todo", "");
    scrollback.print(tracker.flush_to_scrollback(0, 0, 1, render.as_ref()));
    tracker.handle_tool_end("call_2", false);
    scrollback.print(tracker.flush_to_scrollback(0, 0, 0, render.as_ref()));
    tracker.add_error("rate limited");
    scrollback.print(tracker.flush_to_scrollback(0, 0, 0, render.as_ref()));
    tracker.add_text("Done", 0);
    tracker.finish_turn(render.as_ref());
    scrollback.print(tracker.flush_to_scrollback(0, 0, 0, render.as_ref()));

    let full = tracker.render_all(0, render.as_ref());
    assert_eq!(
        plain(&full),
        "Intro\n\n✓ read a.rs\n✗ grep todo\nError: rate limited\n\nDone\n\n"
    );
    assert_eq!(plain(&scrollback.printed), plain(&expected_print(&full)));
}

#[test]
fn test_trailing_non_text_segment_gets_final_newline() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    let mut scrollback = Scrollback::default();
    tracker.add_text("Checking", 0);
    tracker.handle_tool_start("call_1", "bash", "make", "");
    tracker.handle_tool_end("call_1", true);
    tracker.finish_turn(render.as_ref());
    scrollback.print(tracker.flush_to_scrollback(0, 0, 0, render.as_ref()));

    let full = tracker.render_all(0, render.as_ref());
    assert!(!full.ends_with('\n'));
    assert_eq!(plain(&scrollback.printed), plain(&expected_print(&full)));
}

#[test]
fn test_streaming_markdown_flushes_match_single_pass_render() {
    let (mut tracker, render) = markdown_tracker();
    let mut scrollback = Scrollback::default();
    let source = "First paragraph of the answer.\n\nSecond paragraph with **bold** words.\n\n\
                  ```rust\nfn main() {}\n```\n\nClosing remarks.";

    for piece in source.as_bytes().chunks(7) {
        let piece = std::str::from_utf8(piece).expect("ascii source");
        tracker.add_text(piece, WIDTH);
        scrollback.print(tracker.flush_streaming_text(WIDTH));
    }
    assert!(scrollback.printed.contains("First paragraph"));

    tracker.finish_turn(render.as_ref());
    scrollback.print(tracker.flush_to_scrollback(WIDTH, 0, 0, render.as_ref()));

    let full = tracker.render_all(WIDTH, render.as_ref());
    assert!(plain(&full).contains("Closing remarks."));
    assert_eq!(plain(&scrollback.printed), plain(&expected_print(&full)));
    assert_eq!(plain(&scrollback.printed).matches("First paragraph").count(), 1);
}

#[test]
fn test_streaming_text_after_tool_keeps_separator() {
    let (mut tracker, render) = markdown_tracker();
    let mut scrollback = Scrollback::default();

    tracker.handle_tool_start("call_1", "read", "notes.md", "");
    tracker.handle_tool_end("call_1", true);
    scrollback.print(tracker.flush_to_scrollback(WIDTH, 0, 0, render.as_ref()));

    tracker.add_text("The notes describe the release plan.\n\nNext", WIDTH);
    scrollback.print(tracker.flush_streaming_text(WIDTH));
    tracker.add_text(" steps follow.", WIDTH);
    tracker.finish_turn(render.as_ref());
    scrollback.print(tracker.flush_to_scrollback(WIDTH, 0, 0, render.as_ref()));

    let full = tracker.render_all(WIDTH, render.as_ref());
    assert_eq!(
        plain(&full),
        "✓ read notes.md\n\nThe notes describe the release plan.\n\nNext steps follow.\n\n"
    );
    assert_eq!(plain(&scrollback.printed), plain(&full));
}

#[test]
fn test_streaming_flush_waits_for_earlier_segments() {
    let (mut tracker, _render) = markdown_tracker();
    tracker.handle_tool_start("call_1", "bash", "ls", "");
    tracker.add_text("A paragraph long enough to commit.\n\nMore", WIDTH);
    assert_eq!(tracker.flush_streaming_text(WIDTH), "");
}

#[test]
fn test_already_printed_lines_are_skipped() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    tracker.add_text("line one\nline two", 0);
    tracker.finish_turn(render.as_ref());
    let out = tracker.flush_to_scrollback(0, 1, 0, render.as_ref());
    assert_eq!(out, "line two\n");
}

#[test]
fn test_render_unflushed_shows_live_tail_and_status() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    tracker.add_text("Intro", 0);
    tracker.handle_tool_start("call_1", "bash", "cargo build", "");
    tracker.flush_to_scrollback(0, 0, 0, render.as_ref());
    tracker.apply_event(StreamEvent::Phase("Thinking".to_string()), 0);

    let live = tracker.render_unflushed(0, render.as_ref(), false);
    assert_eq!(plain(&live), "○ bash cargo build\nThinking");
    assert_eq!(tracker.status_line(), Some("Thinking"));

    tracker.apply_event(StreamEvent::Text("ok".to_string()), 0);
    assert_eq!(tracker.status_line(), None);
}

#[test]
fn test_live_view_does_not_flush() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    tracker.add_text("Hello", 0);
    tracker.finish_turn(render.as_ref());
    let first = tracker.render_unflushed(0, render.as_ref(), false);
    let second = tracker.render_unflushed(0, render.as_ref(), false);
    assert_eq!(first, second);
    assert_eq!(tracker.flushed_count(), 0);
}

#[test]
fn test_apply_event_routes_every_kind() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    let events = vec![
        StreamEvent::Text("Editing".to_string()),
        StreamEvent::ToolStart {
            call_id: "call_1".to_string(),
            name: "edit".to_string(),
            info: String::new(),
            args_raw: "{}".to_string(),
        },
        StreamEvent::ToolEnd {
            call_id: "call_1".to_string(),
            name: "edit".to_string(),
            info: "src/main.rs".to_string(),
            success: true,
        },
        StreamEvent::Diff {
            path: "src/main.rs".to_string(),
            old: "a\n".to_string(),
            new: "b\n".to_string(),
            start_line: 1,
        },
        StreamEvent::Image("plot.png".into()),
        StreamEvent::Usage(Usage {
            input_tokens: 3,
            output_tokens: 4,
            ..Usage::default()
        }),
        StreamEvent::Retry {
            attempt: 1,
            max: 3,
            wait_secs: 2,
        },
    ];
    for event in events {
        assert!(!tracker.apply_event(event, 0));
    }
    assert_eq!(tracker.status_line(), Some("Retrying (1/3) in 2s"));
    assert!(tracker.apply_event(StreamEvent::Done { total_tokens: 4 }, 0));
    assert_eq!(tracker.total_tokens(), Some(4));
    assert_eq!(tracker.usage().output_tokens, 4);
    tracker.finish_turn(render.as_ref());

    let kinds: Vec<SegmentKind> = tracker.segments().iter().map(Segment::kind).collect();
    assert_eq!(
        kinds,
        vec![SegmentKind::Text, SegmentKind::Tool, SegmentKind::Diff, SegmentKind::Image]
    );
    let full = plain(&tracker.render_all(0, render.as_ref()));
    assert!(full.starts_with("Editing\n\n✓ edit src/main.rs\n"));
    assert!(full.contains("src/main.rs (+1 -1)"));
    assert!(full.ends_with("[image: plot.png]"));
}

#[test]
fn test_error_event_adds_error_line() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    let terminal = tracker.apply_event(
        StreamEvent::Error(ProviderError::Transport("connection reset".to_string())),
        0,
    );
    assert!(terminal);
    tracker.finish_turn(render.as_ref());
    assert_eq!(tracker.len(), 1);
    assert_eq!(
        plain(&tracker.render_all(0, render.as_ref())),
        "Error: Transport error: connection reset"
    );
}

#[test]
fn test_wave_follows_last_pending_tool() {
    let mut tracker = SegmentTracker::default();
    let now = Instant::now();
    assert_eq!(tracker.tick_wave(now), WavePosition::Paused);

    tracker.handle_tool_start("call_1", "ab", "", "");
    assert_eq!(tracker.tick_wave(now), WavePosition::At(1));
    assert_eq!(tracker.tick_wave(now), WavePosition::Paused);
    assert_eq!(
        tracker.tick_wave(now + Duration::from_secs(5)),
        WavePosition::At(0)
    );

    tracker.handle_tool_end("call_1", true);
    assert_eq!(tracker.wave_position(), WavePosition::At(0));
    assert_eq!(tracker.tick_wave(now), WavePosition::Paused);
}

#[test]
fn test_cancel_pending_tools_unblocks_flush() {
    let render = plain_render_fn();
    let mut tracker = SegmentTracker::default();
    tracker.handle_tool_start("call_1", "bash", "sleep 100", "");
    assert_eq!(tracker.flush_to_scrollback(0, 0, 0, render.as_ref()), "");
    assert_eq!(tracker.cancel_pending_tools(), 1);
    assert_eq!(
        plain(&tracker.flush_to_scrollback(0, 0, 0, render.as_ref())),
        "✗ bash sleep 100"
    );
}

#[test]
fn test_subagent_summary_under_pending_tool() {
    let render = plain_render_fn();
    let registry = Arc::new(SubagentRegistry::new(1024));
    let mut tracker = SegmentTracker::default().with_subagents(Arc::clone(&registry));
    tracker.handle_tool_start("call_1", "task", "explore repo", "");
    registry.apply("call_1", SubagentEvent::ToolStarted("grep".to_string()), Instant::now());

    let live = plain(&tracker.render_unflushed(0, render.as_ref(), false));
    let mut lines = live.lines();
    assert_eq!(lines.next(), Some("○ task explore repo"));
    let summary = lines.next().expect("summary line");
    assert!(summary.starts_with("  └ running grep · 1 tool call"));

    tracker.handle_tool_end("call_1", true);
    assert!(registry.is_empty());
    let live = plain(&tracker.render_unflushed(0, render.as_ref(), false));
    assert_eq!(live, "✓ task explore repo");
}

#[test]
fn test_resize_rerenders_unflushed_text() {
    let (mut tracker, _render) = markdown_tracker();
    tracker.add_text("alpha beta gamma delta epsilon zeta\n\nmore", WIDTH);
    let wide = tracker.render_unflushed(WIDTH, plain_render_fn().as_ref(), false);
    assert!(plain(&wide).starts_with("alpha beta gamma delta epsilon zeta\n"));

    let narrow = tracker.render_unflushed(12, plain_render_fn().as_ref(), false);
    let first_line = plain(&narrow).lines().next().map(str::to_string);
    assert_eq!(first_line.as_deref(), Some("alpha beta"));
}
