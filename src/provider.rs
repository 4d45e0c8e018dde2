//! The contract between track providers and the playback loop.

use std::time::Duration;

use crate::codec::AudioDecoder;
use crate::common::Timecode;
use crate::error::{ContainerError, Result};
use crate::pipeline::Pipeline;

/// Why [`TrackProvider::provide_frames`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// All frames were delivered.
    EndOfStream,
    /// The interrupt flag was raised; frame production can resume with another call.
    Interrupted,
}

/// Frame production and seeking for one track.
pub trait TrackProvider {
    /// Decodes frames and forwards them downstream until the stream ends or the interrupt is
    /// raised.
    fn provide_frames(&mut self) -> Result<FrameOutcome>;

    /// Repositions to `timecode` and returns the timecode playback actually resumes from.
    ///
    /// The requested and achieved pair is also reported downstream.
    fn seek_to_timecode(&mut self, timecode: Timecode) -> Result<Timecode>;

    fn is_seekable(&self) -> bool;

    /// Total or estimated duration, if known.
    fn duration(&self) -> Option<Duration>;

    /// Closes the decoder and the pipeline. A second call fails with
    /// [`ContainerError::Closed`].
    fn close(&mut self) -> Result<()>;
}

/// Metadata exposed by providers that parse it from the container.
pub trait TrackInfo {
    fn title(&self) -> Option<&str>;
    fn author(&self) -> Option<&str>;
    fn isrc(&self) -> Option<&str>;
    fn length(&self) -> Option<Duration>;
}

/// Position of a provider in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    HeaderParsed,
    Streaming,
    Seeking,
    Closed,
}

impl Lifecycle {
    /// Rejects frame production and seeking before the headers are parsed or after close.
    pub(crate) fn ensure_ready(self) -> Result<()> {
        match self {
            Lifecycle::Created => Err(ContainerError::HeadersNotParsed),
            Lifecycle::Closed => Err(ContainerError::Closed),
            _ => Ok(()),
        }
    }

    pub(crate) fn ensure_open(self) -> Result<()> {
        match self {
            Lifecycle::Closed => Err(ContainerError::Closed),
            _ => Ok(()),
        }
    }
}

/// Closes the pipeline (if one was created) and then the decoder.
///
/// Both are always closed; the first failure is returned.
pub(crate) fn close_pair<D, P>(decoder: &mut D, pipeline: Option<&mut P>) -> Result<()>
where
    D: AudioDecoder,
    P: Pipeline,
{
    let pipeline = pipeline.map_or(Ok(()), Pipeline::close);
    let decoder = decoder.close();
    pipeline?;
    decoder?;
    Ok(())
}

/// Closes a provider that is dropped while still open, logging instead of failing.
pub(crate) fn close_on_drop<T: TrackProvider + ?Sized>(provider: &mut T, state: Lifecycle) {
    if state == Lifecycle::Closed {
        return;
    }
    if let Err(err) = provider.close() {
        tracing::warn!("failed to close track provider on drop: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_gates() {
        assert!(matches!(
            Lifecycle::Created.ensure_ready(),
            Err(ContainerError::HeadersNotParsed)
        ));
        assert!(Lifecycle::HeaderParsed.ensure_ready().is_ok());
        assert!(Lifecycle::Seeking.ensure_ready().is_ok());
        assert!(matches!(
            Lifecycle::Closed.ensure_ready(),
            Err(ContainerError::Closed)
        ));
        assert!(Lifecycle::Created.ensure_open().is_ok());
    }
}
