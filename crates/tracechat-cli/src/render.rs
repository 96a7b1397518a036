//! Line-mode rendering of conversations and the live thinking trace

use std::io::{self, Write};

use tracechat_core::{
    Conversation, Message, Role, StepCache, StepStatus, ThinkingStep, classify,
};

/// Carriage return plus erase-line, used to replace the in-progress step
const CLEAR_LINE: &str = "\r\x1b[2K";

fn glyph(status: StepStatus) -> &'static str {
    match status {
        StepStatus::InProgress => "…",
        StepStatus::Done => "✓",
        StepStatus::Failed => "✗",
    }
}

fn write_step(out: &mut impl Write, step: &ThinkingStep) -> io::Result<()> {
    write!(out, "  {} {}", glyph(step.status()), step.text)
}

/// Renders one assistant message as it streams.
///
/// Trace steps are printed once they can no longer change; the last one is
/// kept on a transient line while the trace is still growing. The answer is
/// printed as it arrives. Trace lines that arrive after the answer started
/// go on their own lines below it.
#[derive(Default)]
pub struct LiveMessage {
    cache: StepCache,
    steps_printed: usize,
    content_printed: usize,
    transient: bool,
    /// Cursor sits after answer text with no newline
    mid_line: bool,
    finished: bool,
}

impl LiveMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print whatever changed since the last call
    pub fn update(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.clear_transient(out)?;

        let streaming = message.is_streaming;
        let tracing_phase = streaming && !message.thinking_done && message.content.is_empty();

        // Once the answer starts the trace can no longer show progress
        let steps = self.cache.classify(&message.thinking, tracing_phase);
        let settled = if tracing_phase || (streaming && has_open_line(&message.thinking)) {
            steps.len().saturating_sub(1)
        } else {
            steps.len()
        };

        if settled > self.steps_printed {
            end_line(&mut self.mid_line, out)?;
            for step in &steps[self.steps_printed..settled] {
                write_step(out, step)?;
                writeln!(out)?;
            }
            self.steps_printed = settled;
        }

        if tracing_phase {
            match steps.last() {
                Some(last) => write_step(out, last)?,
                None => write!(out, "  {} Thinking...", glyph(StepStatus::InProgress))?,
            }
            self.transient = true;
        } else if message.is_error {
            end_line(&mut self.mid_line, out)?;
            writeln!(out, "{}", message.content)?;
            self.finished = true;
        } else if let Some(delta) = message.content.get(self.content_printed..) {
            if !delta.is_empty() {
                write!(out, "{}", delta)?;
                self.mid_line = !delta.ends_with('\n');
            }
            self.content_printed = message.content.len();
        }

        if !streaming && !self.finished {
            end_line(&mut self.mid_line, out)?;
            self.finished = true;
        }

        out.flush()
    }

    fn clear_transient(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.transient {
            write!(out, "{}", CLEAR_LINE)?;
            self.transient = false;
        }
        Ok(())
    }
}

fn end_line(mid_line: &mut bool, out: &mut impl Write) -> io::Result<()> {
    if *mid_line {
        writeln!(out)?;
        *mid_line = false;
    }
    Ok(())
}

/// Whether the trace ends in a line that is still being written
fn has_open_line(thinking: &str) -> bool {
    thinking
        .rsplit('\n')
        .next()
        .is_some_and(|tail| !tail.trim().is_empty())
}

/// Print a settled conversation
pub fn print_conversation(conversation: &Conversation, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "# {}", conversation.title)?;
    for message in &conversation.messages {
        print_message(message, out)?;
    }
    Ok(())
}

fn print_message(message: &Message, out: &mut impl Write) -> io::Result<()> {
    match message.role {
        Role::User => writeln!(out, "> {}", message.content),
        Role::Assistant => {
            for step in classify(&message.thinking, message.is_streaming) {
                write_step(out, &step)?;
                writeln!(out)?;
            }
            writeln!(out, "{}", message.content)?;
            writeln!(out)
        }
    }
}
