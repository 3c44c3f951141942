//! Async driver for an [`Engine`]
//!
//! One task owns the engine. It feeds gdb's stdout into it, writes the
//! commands it produces to gdb's stdin, and applies requests arriving from
//! the rest of the program over a channel.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::engine::{Engine, Snapshot};
use crate::events::{EngineEvent, EngineHooks};
use crate::types::ViewKind;
use crate::Result;

const READ_BUFFER_SIZE: usize = 4096;

/// Requests applied to the engine by the session task
#[derive(Debug)]
pub enum SessionRequest {
    /// A line typed by the user
    Submit(String),
    /// A command whose reply is delivered privately
    SubmitTracked(String, oneshot::Sender<String>),
    Refresh(ViewKind),
    SetViewVisible(ViewKind, bool),
    SetWatchVisible(bool),
    WatchCreate(String),
    WatchExpand(String),
    WatchCollapse(String),
    WatchUpdateAll,
    WatchDelete(String),
    Snapshot(oneshot::Sender<Snapshot>),
    Shutdown,
}

/// Run `engine` until gdb closes its output or a shutdown is requested
///
/// The engine is handed back so callers can inspect its final state.
pub async fn run_session<H, R, W>(
    mut engine: Engine<H>,
    mut reader: R,
    mut writer: W,
    mut requests: mpsc::UnboundedReceiver<SessionRequest>,
) -> Result<Engine<H>>
where
    H: EngineHooks,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    log::debug!("GDB session started");
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut requests_open = true;

    write_outgoing(&mut engine, &mut writer).await?;

    loop {
        tokio::select! {
            biased;

            request = requests.recv(), if requests_open => match request {
                Some(SessionRequest::Shutdown) => {
                    engine.shutdown();
                    break;
                }
                Some(request) => apply_request(&mut engine, request),
                None => {
                    log::debug!("Request channel closed");
                    requests_open = false;
                }
            },
            read = reader.read(&mut buffer) => match read? {
                0 => {
                    log::debug!("GDB stdout: EOF reached");
                    break;
                }
                n => engine.feed_bytes(&buffer[..n]),
            },
        }

        write_outgoing(&mut engine, &mut writer).await?;
    }

    log::debug!("GDB session finished");
    Ok(engine)
}

fn apply_request<H: EngineHooks>(engine: &mut Engine<H>, request: SessionRequest) {
    log::trace!("Request: {:?}", request);

    let result = match request {
        SessionRequest::Submit(text) => {
            engine.submit(&text);
            Ok(())
        }
        SessionRequest::SubmitTracked(text, reply) => {
            engine.submit_tracked(&text, move |capture| {
                let _ = reply.send(capture.to_string());
            });
            Ok(())
        }
        SessionRequest::Refresh(kind) => {
            if !engine.refresh(kind) {
                log::debug!("Refresh of {} skipped", kind);
            }
            Ok(())
        }
        SessionRequest::SetViewVisible(kind, visible) => {
            engine.set_view_visible(kind, visible);
            Ok(())
        }
        SessionRequest::SetWatchVisible(visible) => {
            engine.set_watch_visible(visible);
            Ok(())
        }
        SessionRequest::WatchCreate(expression) => engine.watch_create(&expression),
        SessionRequest::WatchExpand(handle) => engine.watch_expand(&handle),
        SessionRequest::WatchCollapse(handle) => engine.watch_collapse(&handle),
        SessionRequest::WatchUpdateAll => {
            engine.watch_update_all();
            Ok(())
        }
        SessionRequest::WatchDelete(handle) => engine.watch_delete(&handle),
        SessionRequest::Snapshot(reply) => {
            let _ = reply.send(engine.snapshot());
            Ok(())
        }
        SessionRequest::Shutdown => {
            engine.shutdown();
            Ok(())
        }
    };

    if let Err(e) = result {
        log::warn!("Request rejected: {}", e);
        engine.hooks_mut().on_message(&e.to_string());
    }
}

async fn write_outgoing<H, W>(engine: &mut Engine<H>, writer: &mut W) -> Result<()>
where
    H: EngineHooks,
    W: AsyncWrite + Unpin,
{
    let outgoing = engine.take_outgoing();
    if outgoing.is_empty() {
        return Ok(());
    }
    for command in outgoing {
        writer.write_all(command.as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Forward gdb's stderr lines as error text for the transcript
pub fn forward_stderr<R>(stderr: R, events: mpsc::UnboundedSender<EngineEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        log::debug!("GDB stderr reader started");
        let mut lines = BufReader::new(stderr).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    log::debug!("GDB stderr: {}", line);
                    let event = EngineEvent::UserText {
                        text: format!("{}\n", line),
                        is_error: true,
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("GDB stderr read error: {}", e);
                    break;
                }
            }
        }
        log::debug!("GDB stderr reader finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::events::EventLog;
    use tokio_test::io::Builder;

    const PROMPT: &[u8] = b"\n\x1a\x1apre-prompt\n(gdb) \n\x1a\x1aprompt\n";

    #[tokio::test]
    async fn test_submit_is_written_at_first_prompt() {
        let reader = Builder::new().read(PROMPT).build();
        let mut written: Vec<u8> = Vec::new();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(SessionRequest::Submit("break main".to_string())).unwrap();
        drop(tx);

        let engine = Engine::new(EngineConfig::default(), EventLog::new());
        let engine = run_session(engine, reader, &mut written, rx).await.unwrap();

        assert_eq!(written, b"break main\n");
        assert_eq!(engine.in_flight(), Some("break main\n"));
    }

    #[tokio::test]
    async fn test_tracked_reply_reaches_oneshot() {
        let reader = Builder::new()
            .read(PROMPT)
            .read(b"\n\x1a\x1apost-prompt\n")
            .read(b"$1 = 42\n")
            .read(PROMPT)
            .build();
        let mut written: Vec<u8> = Vec::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();

        tx.send(SessionRequest::SubmitTracked("print 42".to_string(), reply_tx))
            .unwrap();
        drop(tx);

        let engine = Engine::new(EngineConfig::default(), EventLog::new());
        let engine = run_session(engine, reader, &mut written, rx).await.unwrap();

        assert_eq!(written, b"print 42\n");
        assert_eq!(reply_rx.await.unwrap(), "$1 = 42\n");
        assert!(engine.is_idle());
    }

    #[tokio::test]
    async fn test_rejected_watch_request_becomes_message() {
        let reader = Builder::new().read(PROMPT).build();
        let mut written: Vec<u8> = Vec::new();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(SessionRequest::WatchDelete("var1.x".to_string())).unwrap();
        drop(tx);

        let engine = Engine::new(EngineConfig::default(), EventLog::new());
        let engine = run_session(engine, reader, &mut written, rx).await.unwrap();

        assert_eq!(
            engine.hooks().count(|e| matches!(e, EngineEvent::Message(_))),
            1
        );
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_eof() {
        let reader = Builder::new().build();
        let mut written: Vec<u8> = Vec::new();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(SessionRequest::Shutdown).unwrap();

        let engine = Engine::new(EngineConfig::default(), EventLog::new());
        let engine = run_session(engine, reader, &mut written, rx).await.unwrap();

        assert!(!engine.is_idle());
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn test_stderr_lines_become_error_text() {
        let stderr = Builder::new().read(b"warning: no symbols\n").build();
        let (tx, mut rx) = mpsc::unbounded_channel();

        forward_stderr(stderr, tx).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(EngineEvent::UserText {
                text: "warning: no symbols\n".to_string(),
                is_error: true,
            })
        );
    }
}
