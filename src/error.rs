use std::fmt;

#[derive(Debug)]
pub enum NumlogError {
    InvalidRecord(String),
    Store(std::io::Error),
    Io(std::io::Error),
    Config(String),
    PoolClosed,
}

impl NumlogError {
    /// True for faults of the record store, which take the whole server down.
    pub fn is_store_fault(&self) -> bool {
        matches!(self, NumlogError::Store(_))
    }
}

impl fmt::Display for NumlogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumlogError::InvalidRecord(e) => write!(f, "Invalid record: {:?}", e),
            NumlogError::Store(e) => write!(f, "Record store error: {}", e),
            NumlogError::Io(e) => write!(f, "IO error: {}", e),
            NumlogError::Config(e) => write!(f, "Config error: {}", e),
            NumlogError::PoolClosed => write!(f, "Worker pool is shut down"),
        }
    }
}

impl std::error::Error for NumlogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NumlogError::Store(e) | NumlogError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NumlogError {
    fn from(err: std::io::Error) -> Self {
        NumlogError::Io(err)
    }
}
