use archive_engine::ArchiveError;
use archiver_api::BrokerError;

/// Failure while turning a raw payload into JSON.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),

    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("archive contains no entries")]
    NoEntriesFound,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

/// Why a consumer session ended.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("broker closed the stream")]
    EndOfStream,

    #[error("broker: {0}")]
    Broker(#[from] BrokerError),

    #[error("content: {0}")]
    Content(#[from] ContentError),

    #[error("merge: {0}")]
    Merge(#[from] MergeError),

    #[error("archive: {0}")]
    Archive(#[from] ArchiveError),
}
