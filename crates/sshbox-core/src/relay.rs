//! Output relay
//!
//! Streams a container's output to the operator's stderr in the background
//! so boot diagnostics are visible while waiting for readiness. The relay
//! must be explicitly terminated whenever the container stops being the
//! session's subject; dropping the relay also stops it.

use crate::Result;
use sshbox_provider::{ContainerId, ContainerRuntime};
use tokio::task::JoinHandle;

/// Background task copying container output to stderr
pub struct OutputRelay {
    task: JoinHandle<()>,
}

impl OutputRelay {
    /// Attach to a container's output stream
    pub async fn attach(runtime: &dyn ContainerRuntime, id: &ContainerId) -> Result<Self> {
        tracing::debug!("Attaching to output of container {}", id.short());
        let output = runtime.attach_output(id).await?;
        let task = tokio::spawn(async move {
            let mut stream = output.stream;
            let mut stderr = tokio::io::stderr();
            let _ = tokio::io::copy(&mut stream, &mut stderr).await;
        });
        Ok(Self { task })
    }

    /// Stop relaying output
    pub fn detach(self) {
        tracing::debug!("Detaching output relay");
        // Drop aborts the task.
    }
}

impl Drop for OutputRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}
