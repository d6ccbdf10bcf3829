use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use log::{debug, trace};
use tokio::process::Command;
use tokio::time::timeout;
use crate::error::Failure;

/// Run an external tool to completion, bounded by `limit`. Output from a
/// non-zero exit is still returned when stdout is non-empty since lsof
/// and friends report partial matches that way.
pub async fn run(program: &str, args: &[&str], limit: Duration) -> Result<String, Failure> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
        debug!("{} failed to spawn: {}", program, e);
        match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                Failure::Unavailable(program.to_owned())
            }
            _ => Failure::Exit(program.to_owned(), None),
        }
    })?;

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e))     => {
            debug!("{} failed: {}", program, e);
            return Err(Failure::Exit(program.to_owned(), None));
        }
        Err(_)         => {
            debug!("{} {:?} timed out", program, args);
            return Err(Failure::Timeout(program.to_owned(), limit));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

    trace!("{} {:?}: {} bytes, {}", program, args, stdout.len(), output.status);

    if !output.status.success() && stdout.trim().is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("{} {:?} exited {}: {}", program, args, output.status, stderr.trim());
        return Err(Failure::Exit(program.to_owned(), output.status.code()));
    }

    Ok(stdout)
}
