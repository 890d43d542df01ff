use std::io;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;

use crate::allocator::SlotAllocator;
use crate::command::{self, Command};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;

fn codec_err(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "line too long")
        }
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn render(result: &ScheduleResult) -> String {
    let offsets = join(&result.offsets());
    let line = match result {
        ScheduleResult::Batch(outcome) if !outcome.is_complete() => {
            format!("PARTIAL {} {offsets}", outcome.shortfall)
        }
        _ => format!("OK {offsets}"),
    };
    line.trim_end().to_string()
}

/// Execute one protocol line and render the single-line reply.
pub async fn handle_line(allocator: &SlotAllocator, line: &str, now: Ts) -> String {
    let cmd = match command::parse_line(line, now) {
        Ok(cmd) => cmd,
        Err(e) => {
            metrics::counter!(crate::observability::COMMANDS_TOTAL, "command" => "invalid", "status" => "error")
                .increment(1);
            return format!("ERR {e}");
        }
    };
    let label = crate::observability::command_label(&cmd);

    let reply = match cmd {
        Command::Allocate(request) => allocator
            .allocate(request)
            .await
            .map(|result| render(&result)),
        Command::Release { class, at } => allocator
            .release(class, at)
            .await
            .map(|released| format!("OK {}", u8::from(released))),
        Command::Taken { class } => allocator.taken(class).await.map(|taken| {
            let stamps: Vec<String> = taken
                .iter()
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .collect();
            format!("OK {}", stamps.join(" ")).trim_end().to_string()
        }),
    };

    let status = if reply.is_ok() { "ok" } else { "error" };
    metrics::counter!(crate::observability::COMMANDS_TOTAL, "command" => label, "status" => status)
        .increment(1);
    reply.unwrap_or_else(|e| format!("ERR {e}"))
}

/// Serve one client until it disconnects. One reply line per request line.
pub async fn process_connection(socket: TcpStream, allocator: Arc<SlotAllocator>) -> io::Result<()> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    // Framed yields one None after a decode error before it resumes reading.
    let mut recovering = false;
    loop {
        let line = match framed.next().await {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                framed
                    .send(format!("ERR line exceeds {MAX_LINE_LEN} bytes"))
                    .await
                    .map_err(codec_err)?;
                recovering = true;
                continue;
            }
            Some(Err(e)) => return Err(codec_err(e)),
            None if recovering => {
                recovering = false;
                continue;
            }
            None => break,
        };
        recovering = false;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!("command: {line}");
        let reply = handle_line(&allocator, line, Utc::now()).await;
        framed.send(reply).await.map_err(codec_err)?;
    }
    Ok(())
}
