use std::path::PathBuf;

/// the crate-wide error taxonomy (repository / object / ref / index / working-tree /
/// validation / io / cancellation)
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fatal: not a repository (or any parent up to mount point): {0}")]
    NotARepository(PathBuf),

    #[error("repository already exists at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("failed to read repository metadata at {0}")]
    MetadataUnreadable(PathBuf),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("malformed object: {0}")]
    MalformedObject(String),

    #[error("object {hash} declares size {declared} but content is {actual} bytes")]
    SizeMismatch {
        hash: String,
        declared: usize,
        actual: usize,
    },

    #[error("unknown object type: {0}")]
    UnknownObjectType(String),

    #[error("object {0} is not a {1}")]
    WrongKind(String, &'static str),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("symbolic ref cycle or depth exceeded resolving {0}")]
    RefCycle(String),

    #[error("not a valid ref or hash: {0}")]
    InvalidRef(String),

    #[error("ambiguous object prefix {0} matches more than one object")]
    AmbiguousReference(String),

    #[error("malformed index: {0}")]
    MalformedIndex(String),

    #[error("index is locked by another process (pid {0:?})")]
    IndexLocked(Option<i32>),

    #[error("failed to stat {0}")]
    StatFailed(PathBuf),

    #[error("working tree has uncommitted changes that conflict with checkout: {0:?}")]
    DirtyWorkingTree(Vec<String>),

    #[error("failed to create symlink at {0}")]
    SymlinkFailed(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("no commits yet")]
    NoCommitsYet,

    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("cannot delete the currently checked out branch: {0}")]
    CannotDeleteCurrentBranch(String),

    #[error("branch {0} is not fully merged; use force to delete anyway")]
    BranchNotMerged(String),

    #[error("checkout target is not empty: {0}")]
    TargetNotEmpty(PathBuf),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compression error: {0}")]
    Compression(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("index encode error: {0}")]
    IndexEncode(#[from] bincode::error::EncodeError),

    #[error("index decode error: {0}")]
    IndexDecode(#[from] bincode::error::DecodeError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// attaches path context to a raw io error
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
