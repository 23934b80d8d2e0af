//! Operator console: a line-oriented control surface on stdin.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The only command the console understands.
pub const SHUTDOWN_COMMAND: &str = "exit";

/// Read commands until `exit`, end of input, or shutdown from elsewhere.
///
/// End of input stops the console but leaves the service running.
pub async fn run<R, W>(input: R, mut output: W, shutdown: CancellationToken) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            debug!("Console input closed");
            return Ok(());
        };

        if line.trim() == SHUTDOWN_COMMAND {
            info!("Shutdown requested from console");
            output.write_all(b"Shutting down, please wait...\n").await?;
            output.flush().await?;
            shutdown.cancel();
            return Ok(());
        }

        output
            .write_all(format!("Type '{SHUTDOWN_COMMAND}' to stop the server\n").as_bytes())
            .await?;
        output.flush().await?;
    }
}
