use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid device profile: {0}")]
    ProfileParse(#[from] toml::de::Error),

    #[error("recovery fstab line {line}: {reason}")]
    FstabParse { line: usize, reason: String },

    #[error("mount point not in fstab: {0}")]
    UnknownMountPoint(String),

    #[error("unknown filesystem type: {0}")]
    UnknownFsType(String),

    #[error("package member escapes the input directory: {0}")]
    UnsafePackagePath(String),

    #[error("{0} needs at least one argument")]
    EmptyArgument(&'static str),

    #[error("package file not found: {0}")]
    MissingPackageFile(String),

    #[error("unknown preset: {0}")]
    UnknownPreset(String),
}

pub type Result<T> = std::result::Result<T, EdifyError>;
