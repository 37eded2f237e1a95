use anyhow::{Context, Result};
use bytes::Bytes;
use futures::stream;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use vexrender::api::{provider_stream_from_bytes, ByteStream};
use vexrender::config::RenderConfig;
use vexrender::markdown::EngineCache;
use vexrender::state::{SegmentTracker, SubagentRegistry};
use vexrender::stream::process_stream;
use vexrender::terminal::{self, LiveRegion};
use vexrender::types::ProviderError;
use vexrender::ui::{ImageCache, PlaceholderImageRenderer, WidthRenderFn};

const READ_CHUNK_BYTES: usize = 8 * 1024;

fn reader_stream<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    Box::pin(stream::unfold(Some(reader), |reader| async move {
        let mut reader = reader?;
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(read) => {
                buf.truncate(read);
                Some((Ok(Bytes::from(buf)), Some(reader)))
            }
            Err(err) => Some((Err(ProviderError::Transport(err.to_string())), None)),
        }
    }))
}

fn current_width(config: &RenderConfig) -> usize {
    if config.plain_output {
        0
    } else {
        terminal::terminal_width()
    }
}

/// Replays a recorded SSE response (file argument, or stdin) through the
/// rendering core.
#[tokio::main]
async fn main() -> Result<()> {
    vexrender::logging::init_tracing()?;
    let config = RenderConfig::load()?;
    config.validate()?;

    let input: Box<dyn AsyncRead + Unpin + Send> = match std::env::args().nth(1) {
        Some(path) if path != "-" => Box::new(
            tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {path}"))?,
        ),
        _ => Box::new(tokio::io::stdin()),
    };

    let mut width = current_width(&config);
    let engines = Arc::new(EngineCache::new(config.engine_cache_capacity));
    let mut render_fn = WidthRenderFn::new(Arc::clone(&engines), width);
    let images = ImageCache::new(
        config.image_cache_capacity,
        Arc::new(PlaceholderImageRenderer),
    );
    let mut tracker = SegmentTracker::new(&config, Arc::clone(&engines))
        .with_images(Arc::new(images))
        .with_subagents(Arc::new(SubagentRegistry::new(config.subagent_text_cap)))
        .with_text_render_fn(Arc::clone(render_fn.get()));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let mut events = process_stream(
        cancel.clone(),
        provider_stream_from_bytes(reader_stream(input)),
        config.channel_capacity,
    );
    let mut region = LiveRegion::stdout();
    let mut ticker = tokio::time::interval(tracker.wave_tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                width = current_width(&config);
                if render_fn.update(width) {
                    tracing::debug!(width, "terminal width changed");
                    tracker.set_text_render_fn(Arc::clone(render_fn.get()));
                }
                if tracker.apply_event(event, width) {
                    break;
                }
                region.print_scrollback(&tracker.flush_streaming_text(width))?;
                let flushed = tracker.flush_to_scrollback(
                    width,
                    0,
                    config.min_keep_segments,
                    render_fn.get().as_ref(),
                );
                region.print_scrollback(&flushed)?;
            }
            _ = ticker.tick() => {
                tracker.tick_wave(Instant::now());
            }
        }
        if region.is_interactive() {
            let live = tracker.render_unflushed(width, render_fn.get().as_ref(), true);
            region.draw(&live, width)?;
        }
    }

    let abandoned = tracker.cancel_pending_tools();
    if abandoned > 0 {
        tracing::debug!(abandoned, cancelled = cancel.is_cancelled(), "tools never finished");
    }
    tracker.finish_turn(render_fn.get().as_ref());
    region.draw("", width)?;
    region.print_scrollback(&tracker.flush_to_scrollback(
        width,
        0,
        0,
        render_fn.get().as_ref(),
    ))?;

    let usage = tracker.usage();
    tracing::info!(
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        total = tracker.total_tokens().unwrap_or_default(),
        "turn finished"
    );
    Ok(())
}
