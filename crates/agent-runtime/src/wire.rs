//! Line-oriented response pumping shared by the streaming backends.
//!
//! Both supported wire formats (Ollama NDJSON, OpenAI-style SSE) are
//! newline-delimited; the transport-specific part is only how one line
//! turns into fragments, so that is injected as a parser.

use tokio::sync::mpsc;

use agent_core::error::{AgentError, Result};
use agent_core::provider::RawFragment;

/// Read the response body line by line, feeding parsed fragments into the
/// channel until the parser reports completion, the body ends, or the
/// receiver goes away.
///
/// If the body ends before the parser saw an end-of-stream marker, the
/// channel simply closes; the normalizer reports the truncation.
pub(crate) async fn pump_lines<F>(
    mut response: reqwest::Response,
    tx: mpsc::Sender<Result<RawFragment>>,
    mut parse: F,
) where
    F: FnMut(&str) -> Result<(Vec<RawFragment>, bool)> + Send,
{
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let chunk = match response.chunk().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(err) => {
                let _ = tx.send(Err(AgentError::Transport(err.to_string()))).await;
                return;
            }
        };

        buffer.extend_from_slice(&chunk);
        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse(line) {
                Ok((fragments, finished)) => {
                    for fragment in fragments {
                        if tx.send(Ok(fragment)).await.is_err() {
                            return;
                        }
                    }
                    if finished {
                        return;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            }
        }
    }
}
