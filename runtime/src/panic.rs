//! Panic payload and stack capture for recovered handler panics.
//!
//! `catch_unwind` hands back the payload only after the stack has unwound,
//! so the trace is captured earlier by a process-wide panic hook and parked
//! in a thread local. The dispatcher's recovery runs on the same thread in
//! the same poll, and takes it from there.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

/// Frames kept in a logged trace.
pub(crate) const TRACE_FRAMES: usize = 5;

thread_local! {
    static LAST_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Install the capturing hook once per process.
///
/// The previously installed hook still runs, so default panic output is
/// unchanged.
pub(crate) fn install_trace_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            LAST_TRACE.with(|slot| {
                *slot.borrow_mut() = Some(Backtrace::force_capture());
            });
            previous(info);
        }));
    });
}

/// Take the trace captured for the most recent panic on this thread.
pub(crate) fn take_trace() -> String {
    LAST_TRACE
        .with(|slot| slot.borrow_mut().take())
        .map_or_else(|| String::from("<unavailable>"), |trace| minimal_stack(&trace.to_string()))
}

/// Human readable panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("<non-string panic payload>")
    }
}

/// Reduce a rendered backtrace to the frames nearest the panic site.
///
/// Frames belonging to the unwinding machinery (`std`, `core`, `alloc`,
/// the hook itself) are dropped, so the first frame kept is the one that
/// panicked. At most [`TRACE_FRAMES`] are kept.
fn minimal_stack(rendered: &str) -> String {
    let kept: Vec<String> = split_frames(rendered)
        .iter()
        .filter(|frame| !frame.is_runtime_internal())
        .take(TRACE_FRAMES)
        .map(Frame::render)
        .collect();

    if kept.is_empty() {
        String::from("<unavailable>")
    } else {
        kept.join("\n")
    }
}

struct Frame<'a> {
    symbol: &'a str,
    location: Option<&'a str>,
}

impl Frame<'_> {
    fn is_runtime_internal(&self) -> bool {
        const INTERNAL: [&str; 7] = [
            "std::",
            "core::",
            "alloc::",
            "<alloc::",
            "<core::",
            "<std::",
            "plugboard_runtime::panic::install_trace_hook",
        ];
        // Newer toolchains prefix the unwind entry points with `__rustc::`.
        let symbol = self.symbol.strip_prefix("__rustc::").unwrap_or(self.symbol);
        INTERNAL.iter().any(|prefix| symbol.starts_with(prefix))
            || symbol.contains("rust_begin_unwind")
            || symbol.contains("__rust_")
    }

    fn render(&self) -> String {
        match self.location {
            Some(location) => format!("{} ({location})", self.symbol),
            None => self.symbol.to_string(),
        }
    }
}

/// Parse `std::backtrace` output: `  N: symbol` lines, each optionally
/// followed by an `at path:line:col` line.
fn split_frames(rendered: &str) -> Vec<Frame<'_>> {
    let mut frames: Vec<Frame<'_>> = Vec::new();

    for line in rendered.lines() {
        let line = line.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                last.location.get_or_insert(location);
            }
            continue;
        }

        if let Some((index, symbol)) = line.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                frames.push(Frame {
                    symbol,
                    location: None,
                });
            }
        }
    }

    frames
}
