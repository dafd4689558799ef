//! Abstract text surfaces the orchestrator writes to.
//!
//! A surface is whatever the editor shows (a window body, a terminal pane).
//! The core only needs four operations; `SurfaceHandle` adds the mutual
//! exclusion that lets several tasks append to one surface concurrently.

use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Surface closed: {0}")]
    Closed(String),
}

pub trait TextSurface: Send {
    fn clear(&mut self) -> Result<(), SurfaceError>;
    /// Replace the whole contents.
    fn write(&mut self, text: &str) -> Result<(), SurfaceError>;
    fn append(&mut self, text: &str) -> Result<(), SurfaceError>;
    fn read(&self) -> Result<String, SurfaceError>;
}

/// Shared, serialized access to one surface.
#[derive(Clone)]
pub struct SurfaceHandle {
    inner: Arc<Mutex<Box<dyn TextSurface>>>,
}

impl SurfaceHandle {
    pub fn new(surface: impl TextSurface + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(surface))),
        }
    }

    pub fn clear(&self) -> Result<(), SurfaceError> {
        self.inner.lock().clear()
    }

    pub fn write(&self, text: &str) -> Result<(), SurfaceError> {
        self.inner.lock().write(text)
    }

    pub fn append(&self, text: &str) -> Result<(), SurfaceError> {
        self.inner.lock().append(text)
    }

    pub fn read(&self) -> Result<String, SurfaceError> {
        self.inner.lock().read()
    }

    /// Append, logging instead of failing. Used by stream drains, which must
    /// keep reading to end-of-stream whatever happens to the display.
    pub fn append_lossy(&self, text: &str) {
        if let Err(e) = self.append(text) {
            tracing::warn!(error = %e, "Surface write failed");
        }
    }
}

impl std::fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceHandle").finish_non_exhaustive()
    }
}

/// In-memory surface
#[derive(Debug, Default, Clone)]
pub struct BufferSurface {
    contents: String,
}

impl BufferSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TextSurface for BufferSurface {
    fn clear(&mut self) -> Result<(), SurfaceError> {
        self.contents.clear();
        Ok(())
    }

    fn write(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.contents = text.to_string();
        Ok(())
    }

    fn append(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.contents.push_str(text);
        Ok(())
    }

    fn read(&self) -> Result<String, SurfaceError> {
        Ok(self.contents.clone())
    }
}

/// Echoes every change to a terminal stream while keeping a readable copy.
pub struct ConsoleSurface {
    buffer: BufferSurface,
    out: Box<dyn Write + Send>,
}

impl ConsoleSurface {
    pub fn stdout() -> Self {
        Self {
            buffer: BufferSurface::new(),
            out: Box::new(std::io::stdout()),
        }
    }

    pub fn stderr() -> Self {
        Self {
            buffer: BufferSurface::new(),
            out: Box::new(std::io::stderr()),
        }
    }
}

impl TextSurface for ConsoleSurface {
    fn clear(&mut self) -> Result<(), SurfaceError> {
        self.buffer.clear()
    }

    fn write(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.buffer.write(text)?;
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    fn append(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.buffer.append(text)?;
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    fn read(&self) -> Result<String, SurfaceError> {
        self.buffer.read()
    }
}
