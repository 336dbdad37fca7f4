use thiserror::Error;

/// Local failures of value operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("Undefined constant {name}")]
    UndefinedConstant { name: String },

    #[error("Cannot add element to the array as the next element is already occupied")]
    NextIndexOccupied,
}
