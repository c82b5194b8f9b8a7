/// Errors from alphabet construction and short id encoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("alphabet must contain at least 3 characters, got {0}")]
    AlphabetTooShort(usize),

    #[error("alphabet contains non-alphanumeric character {0:?}")]
    NonAlphanumeric(char),

    #[error("alphabet contains duplicate character {0:?}")]
    DuplicateCharacter(char),

    #[error("sqids encoder rejected the input: {0}")]
    Encoder(String),

    #[error("{0:?} is not a short id produced by this generator")]
    Undecodable(String),
}

impl From<sqids::Error> for IdError {
    fn from(err: sqids::Error) -> Self {
        Self::Encoder(err.to_string())
    }
}
