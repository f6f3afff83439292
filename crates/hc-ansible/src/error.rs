#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// Contradictory or malformed arguments, detected before any remote mutation.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("'name' or 'id' is required")]
    MissingIdentity,

    #[error("{0}")]
    Remote(#[from] hc_infra::Error),

    /// One or more reconciliation targets failed.
    #[error("{}", .0.join(", "))]
    Aggregate(Vec<String>),

    #[error("{0}")]
    Arguments(String),

    #[error("cannot encode module output: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModuleError>;

impl ModuleError {
    /// Collapse a list of validation problems into one error, if any.
    pub fn validation(errors: Vec<String>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ModuleError::Validation(errors.join(", ")))
        }
    }
}
