#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("archive: {0}")]
    Archive(#[from] archive_engine::ArchiveError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
