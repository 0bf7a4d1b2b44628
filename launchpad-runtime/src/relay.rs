//! Copies process output into the sink.

use std::sync::Arc;

use launchpad_sandbox::{OutputStream, Process};

use crate::sink::{OutputSink, SinkError};
use crate::state::{StateMachine, Step};

/// Forward every chunk of `output` to `sink`, in order, until the stream ends.
/// Returns the number of chunks written.
pub(crate) async fn relay(
    mut output: OutputStream,
    sink: Arc<dyn OutputSink>,
) -> Result<usize, SinkError> {
    let mut chunks = 0usize;
    while let Some(chunk) = output.next_chunk().await {
        sink.write(&chunk)?;
        chunks += 1;
    }
    Ok(chunks)
}

/// Relay the server's output for its whole life, then report why it stopped.
///
/// The server is expected to run indefinitely, so any end of its output or
/// exit moves the lifecycle to `Failed`.
pub(crate) async fn supervise_server(
    process: Process,
    sink: Arc<dyn OutputSink>,
    state: Arc<StateMachine>,
) {
    let command = process.command().to_string();
    let (output, exit) = process.into_parts();

    let reason = match relay(output, sink).await {
        Err(err) => format!("output relay for '{command}' failed: {err}"),
        Ok(chunks) => {
            tracing::debug!(command = %command, chunks, "server output closed");
            match exit.wait().await {
                Ok(code) => format!("server process '{command}' exited with code {code}"),
                Err(err) => err.to_string(),
            }
        }
    };

    if state.fail(Step::Serve, reason.clone()) {
        tracing::error!(command = %command, reason = %reason, "server supervision ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;

    #[tokio::test]
    async fn relay_preserves_chunk_order() {
        let (output_tx, _exit_tx, process) = Process::channel("npm install");
        let (output, _exit) = process.into_parts();
        let sink = Arc::new(RecordingSink::new());
        sink.open().expect("open");

        let task = tokio::spawn(relay(output, sink.clone()));
        for i in 0..50 {
            output_tx.send(format!("chunk-{i}\n")).await.expect("send");
        }
        drop(output_tx);

        assert_eq!(task.await.expect("join").expect("relay"), 50);
        let expected: Vec<String> = (0..50).map(|i| format!("chunk-{i}\n")).collect();
        assert_eq!(sink.writes(), expected);
    }

    #[tokio::test]
    async fn relay_stops_on_sink_error() {
        let (output_tx, _exit_tx, process) = Process::channel("npm install");
        let (output, _exit) = process.into_parts();
        let sink = Arc::new(RecordingSink::new());

        output_tx.send("never shown".to_string()).await.expect("send");
        drop(output_tx);
        let err = relay(output, sink).await.unwrap_err();
        assert!(matches!(err, SinkError::NotOpen));
    }
}
