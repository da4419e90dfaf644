//! Consent surfaces.
//!
//! A surface shows the configure URL to the user so they can approve the
//! device code. Opening returns immediately; the handshake closes the
//! returned handle exactly once when polling ends.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tracing::{debug, info};

/// Errors from consent surfaces.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("failed to open consent surface: {0}")]
    Open(String),

    #[error("failed to close consent surface: {0}")]
    Close(String),
}

/// Boxed future returned by [`SurfaceHandle::close`].
pub type SurfaceFuture = Pin<Box<dyn Future<Output = Result<(), SurfaceError>> + Send>>;

/// Something able to present a consent URL to the user.
pub trait ConsentSurface: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn SurfaceHandle>, SurfaceError>;
}

/// An open consent surface.
pub trait SurfaceHandle: Send {
    fn close(self: Box<Self>) -> SurfaceFuture;
}

/// Logs the consent URL instead of opening anything.
///
/// Suitable for headless hosts where the user copies the URL manually.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSurface;

impl ConsentSurface for LogSurface {
    fn open(&self, url: &str) -> Result<Box<dyn SurfaceHandle>, SurfaceError> {
        info!(%url, "open this URL to approve the connection");
        Ok(Box::new(NoopHandle))
    }
}

struct NoopHandle;

impl SurfaceHandle for NoopHandle {
    fn close(self: Box<Self>) -> SurfaceFuture {
        Box::pin(async { Ok(()) })
    }
}

/// Opens the consent URL with an external program, the system browser by
/// default.
#[derive(Debug, Clone)]
pub struct BrowserSurface {
    program: String,
    args: Vec<String>,
}

impl BrowserSurface {
    /// Uses the platform URL opener.
    pub fn new() -> Self {
        #[cfg(target_os = "windows")]
        {
            Self::with_command("cmd", ["/C", "start", ""])
        }

        #[cfg(target_os = "macos")]
        {
            Self::with_command("open", [] as [&str; 0])
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            Self::with_command("xdg-open", [] as [&str; 0])
        }
    }

    /// Uses `program args.. <url>` to open the URL.
    pub fn with_command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for BrowserSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsentSurface for BrowserSurface {
    fn open(&self, url: &str) -> Result<Box<dyn SurfaceHandle>, SurfaceError> {
        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SurfaceError::Open(format!("{}: {e}", self.program)))?;
        info!(program = %self.program, %url, "opened consent surface");
        Ok(Box::new(ProcessHandle { child }))
    }
}

struct ProcessHandle {
    child: tokio::process::Child,
}

impl SurfaceHandle for ProcessHandle {
    fn close(self: Box<Self>) -> SurfaceFuture {
        let mut child = self.child;
        Box::pin(async move {
            // Openers usually hand off to the browser and exit on their own.
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(?status, "consent opener already exited");
                    Ok(())
                }
                Ok(None) => {
                    child
                        .kill()
                        .await
                        .map_err(|e| SurfaceError::Close(e.to_string()))?;
                    debug!("consent opener terminated");
                    Ok(())
                }
                Err(e) => Err(SurfaceError::Close(e.to_string())),
            }
        })
    }
}
