use std::io;

use crate::codec::DecoderError;
use crate::pipeline::PipelineError;

/// Errors returned by track providers and the parsers they are built from.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// A magic value, block layout or count in a header is invalid.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The input ended while a mandatory header was being read.
    #[error("input ended while reading {0}")]
    TruncatedInput(&'static str),

    /// Reading or repositioning the byte source failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The codec decoder rejected its configuration or a packet.
    #[error(transparent)]
    Decoder(#[from] DecoderError),

    /// The downstream pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The track cannot be repositioned, e.g. a live MP3 stream of unknown length.
    #[error("track is not seekable")]
    NotSeekable,

    /// Frames or seeks were requested before the headers were parsed.
    #[error("headers have not been parsed")]
    HeadersNotParsed,

    /// The provider was already closed.
    #[error("track provider is closed")]
    Closed,
}

pub type Result<T, E = ContainerError> = std::result::Result<T, E>;

impl ContainerError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedHeader(message.into())
    }
}

/// Maps an end of file while reading a mandatory header to [`ContainerError::TruncatedInput`].
pub(crate) trait HeaderResultExt<T> {
    fn in_header(self, what: &'static str) -> Result<T>;
}

impl<T> HeaderResultExt<T> for io::Result<T> {
    fn in_header(self, what: &'static str) -> Result<T> {
        self.map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => ContainerError::TruncatedInput(what),
            _ => ContainerError::Io(err),
        })
    }
}
