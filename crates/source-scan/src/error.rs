use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("syntax error in {0}")]
    ParseSyntax(String),

    #[error("parser initialization failed: {0}")]
    ParserInit(String),
}
