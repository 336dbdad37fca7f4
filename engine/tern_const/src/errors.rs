use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConstError {
    #[error("Constant {name} already defined")]
    AlreadyDefined { name: String },

    /// The persistent half is shared with workers and can no longer change.
    #[error("cannot register persistent constant {name} after startup")]
    Frozen { name: String },
}
