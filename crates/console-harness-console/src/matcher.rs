//! Streaming, value-checked template matching against session output.
//!
//! Literal pieces must appear byte for byte. A dynamic piece consumes
//! whatever text precedes the next literal and is then compared with the
//! value computed for it, so a wrong OS name or data directory shows up as a
//! mismatch on that placeholder rather than on the text around it.

use std::time::Duration;

use console_harness_core::{Piece, Template, TemplateError};
use console_harness_process::{Fill, OutputStream, Session, SessionError};
use thiserror::Error;
use tokio::time::Instant;

/// Match error.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Output mismatch in {segment}\n--- expected\n{expected}\n--- actual\n{actual}")]
    OutputMismatch {
        segment: String,
        expected: String,
        actual: String,
    },
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Match the next output of `session` against `template`.
///
/// All placeholders, fields and conditions are evaluated before any output
/// is consumed. On success the cursor sits right after the matched text.
///
/// # Errors
/// Returns `OutputMismatch` on a literal or value mismatch, or when output
/// stops or `timeout` passes before the template is complete.
pub async fn expect(
    session: &mut Session,
    template: &Template,
    timeout: Duration,
) -> Result<(), MatchError> {
    let pieces = template.expand(session.context())?;
    let deadline = Instant::now() + timeout;
    let output = session.output_mut();

    for (idx, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Literal(text) => {
                let segment = format!("literal #{idx}");
                let actual = take_exact(output, text.len(), Some(text), deadline).await;
                check(segment, text, actual)?;
            }
            Piece::Dynamic { label, value } => {
                let segment = format!("{{{{{label}}}}}");
                let actual = match pieces.get(idx + 1) {
                    Some(Piece::Literal(next)) => {
                        take_until(output, terminator(next), deadline).await
                    }
                    _ => take_exact(output, value.len(), None, deadline).await,
                };
                check(segment, value, actual)?;
            }
        }
    }

    tracing::debug!(pid = session.pid(), pieces = pieces.len(), "Matched template");
    Ok(())
}

/// Wait for exit status 0 and assert that no unmatched output remains.
///
/// # Errors
/// Returns the session's exit error, or `OutputMismatch` for leftover output.
pub async fn expect_exit(session: &mut Session, timeout: Duration) -> Result<(), MatchError> {
    let exited = session.wait_exit(timeout).await;
    let rest = session
        .output_mut()
        .read_to_end(Instant::now() + timeout)
        .await;
    exited?;

    if rest.is_empty() {
        Ok(())
    } else {
        Err(MatchError::OutputMismatch {
            segment: "<end of output>".to_string(),
            expected: String::new(),
            actual: String::from_utf8_lossy(&rest).into_owned(),
        })
    }
}

/// Outcome of reading one piece's worth of output.
enum Taken {
    Text(String),
    Short { partial: String, why: &'static str },
}

fn check(segment: String, expected: &str, actual: Taken) -> Result<(), MatchError> {
    match actual {
        Taken::Text(text) if text == expected => Ok(()),
        Taken::Text(actual) => Err(MatchError::OutputMismatch {
            segment,
            expected: expected.to_string(),
            actual,
        }),
        Taken::Short { partial, why } => Err(MatchError::OutputMismatch {
            segment: format!("{segment} ({why})"),
            expected: expected.to_string(),
            actual: partial,
        }),
    }
}

/// The part of the following literal a dynamic value must stop at: up to and
/// including its first newline.
fn terminator(next: &str) -> &str {
    next.find('\n').map_or(next, |i| &next[..=i])
}

/// Consume `len` bytes. With `expected`, give up as soon as the bytes seen
/// so far diverge from it instead of waiting for the full length.
async fn take_exact(
    output: &mut OutputStream,
    len: usize,
    expected: Option<&str>,
    deadline: Instant,
) -> Taken {
    loop {
        let pending = output.pending();
        let n = pending.len().min(len);
        let diverged =
            expected.is_some_and(|want| pending[..n] != want.as_bytes()[..n]);
        if n == len || diverged {
            let text = String::from_utf8_lossy(&pending[..n]).into_owned();
            output.consume(n);
            return Taken::Text(text);
        }
        if let Some(why) = wait(output, deadline).await {
            return Taken::Short {
                partial: String::from_utf8_lossy(output.pending()).into_owned(),
                why,
            };
        }
    }
}

/// Consume everything before the next occurrence of `terminator`.
async fn take_until(output: &mut OutputStream, terminator: &str, deadline: Instant) -> Taken {
    let needle = terminator.as_bytes();
    loop {
        let pending = output.pending();
        if let Some(pos) = find(pending, needle) {
            let text = String::from_utf8_lossy(&pending[..pos]).into_owned();
            output.consume(pos);
            return Taken::Text(text);
        }
        if let Some(why) = wait(output, deadline).await {
            return Taken::Short {
                partial: String::from_utf8_lossy(output.pending()).into_owned(),
                why,
            };
        }
    }
}

async fn wait(output: &mut OutputStream, deadline: Instant) -> Option<&'static str> {
    match output.fill(deadline).await {
        Fill::Data => None,
        Fill::Closed => Some("output ended"),
        Fill::TimedOut => Some("timed out"),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
