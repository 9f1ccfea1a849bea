//! Relay session for the CLI
//!
//! Spawns the native messaging host, wires its stdio into the relay, and
//! plays the part of the UI surfaces: each line on our stdin is one
//! logical request, each line we print is one delivered result.

use std::process::Stdio;

use marginalia_core::protocol::{Action, Outcome};
use marginalia_core::{HostChannel, RelayHandle, TracingObserver};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};

/// Run a relay session against a host command.
///
/// Returns the host's exit code. The session ends when our stdin closes
/// or the host disconnects, whichever comes first; exchanges still in
/// flight at that point are abandoned.
pub async fn run_relay_session(
    command: &str,
    args: &[&str],
    host_name: &str,
    json_output: bool,
) -> Result<i32, String> {
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to start host: {e}"))?;

    let host_stdin = child.stdin.take().ok_or("Failed to get host stdin")?;
    let host_stdout = child.stdout.take().ok_or("Failed to get host stdout")?;
    let host_stderr = child.stderr.take().ok_or("Failed to get host stderr")?;

    let channel = HostChannel::new(host_stdout, host_stdin);
    let (handle, relay) = marginalia_core::start(channel, TracingObserver);

    let stderr_task = tokio::spawn(forward_stderr(host_stderr));

    let mut ui_lines = BufReader::new(tokio::io::stdin()).lines();

    // Main session loop
    loop {
        tokio::select! {
            line = ui_lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        dispatch_ui_line(&handle, &line, json_output).await;
                    }
                    Ok(None) => {
                        tracing::info!("stdin closed, ending session");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }

            status = child.wait() => {
                stderr_task.abort();
                return match status {
                    Ok(status) => {
                        tracing::info!("Host '{}' exited with: {}", host_name, status);
                        Ok(status.code().unwrap_or(0))
                    }
                    Err(e) => Err(format!("Error waiting for host: {e}")),
                };
            }
        }
    }

    // Dropping the last handle winds the relay down, which closes the
    // host's stdin; the host exits on EOF.
    let abandoned = handle.in_flight().await;
    if abandoned > 0 {
        tracing::warn!(
            "{} exchange(s) with host '{}' abandoned at session end",
            abandoned,
            host_name
        );
    }
    drop(handle);
    let _ = relay.await;

    let status = child
        .wait()
        .await
        .map_err(|e| format!("Error waiting for host: {e}"))?;
    stderr_task.abort();
    Ok(status.code().unwrap_or(0))
}

/// Parse one UI request line and dispatch it; the result is printed from
/// a background task so slow exchanges do not block the session loop.
async fn dispatch_ui_line(handle: &RelayHandle, line: &str, json_output: bool) {
    let action: Action = match serde_json::from_str(line) {
        Ok(action) => action,
        Err(e) => {
            tracing::error!("Unparseable request line: {}", e);
            return;
        }
    };

    match handle.dispatch(action).await {
        Ok(pending) => {
            tokio::spawn(async move {
                let correlation_id = pending.correlation_id().clone();
                match pending.wait().await {
                    Ok(outcome) => print_outcome(&correlation_id.to_string(), &outcome, json_output),
                    Err(e) => {
                        tracing::error!("Exchange {} failed: {}", correlation_id, e);
                    }
                }
            });
        }
        Err(e) => {
            tracing::error!("Dispatch failed: {}", e);
        }
    }
}

fn print_outcome(correlation_id: &str, outcome: &Outcome, json_output: bool) {
    if json_output {
        let line = serde_json::json!({
            "correlationId": correlation_id,
            "result": outcome,
        });
        println!("{line}");
    } else {
        match outcome {
            Outcome::Singleton(response) => {
                println!("[{}] {}", correlation_id, response.action.name());
            }
            Outcome::Search(results) => {
                println!("[{}] {} result(s)", correlation_id, results.inner.len());
                for site in &results.inner {
                    println!("  {} - {}", site.url, site.title);
                }
            }
        }
    }
}

/// Forward host stderr lines to our logs.
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!("host stderr: {}", line);
    }
}
