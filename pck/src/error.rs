#[derive(thiserror::Error, Debug)]
pub enum Error {
    // std errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("path failed to round-trip through the archive's path codec: {0:?}")]
    PathEncoding(String),

    // format discovery (fatal for mount, §7)
    #[error("not a pck archive (footer guard mismatch)")]
    NotAnArchive,
    #[error("header data_area_size disagrees with footer index_offset")]
    HeaderFooterInconsistent,
    #[error("no known layout decoded a self-consistent index table")]
    UnknownVersion,

    // codec / integrity
    #[error("payload at offset {offset:#x} failed to decompress to the recorded clear_size")]
    PayloadCorrupt { offset: u64 },
    #[error("duplicate path in archive: {0}")]
    DuplicatePath(String),
    #[error("path not found in archive: {0}")]
    MissingEntry(String),

    // session / concurrency
    #[error("archive layout {0} does not support in-place update")]
    Unsupported(&'static str),
    #[error("session has a background operation in progress")]
    Busy,
    #[error("operation cancelled")]
    Cancelled,
    #[error("archive not found: {0}")]
    NotFound(std::path::PathBuf),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
