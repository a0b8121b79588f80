use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of a single compile pass. They never leave [`crate::build_document`];
/// each one is rendered as a diagnostic document instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{message}")]
    ComponentCompile { message: String },

    #[error("component compiler returned no module code")]
    EmptyComponentOutput,
}

impl Error {
    pub fn diagnostic_title(&self) -> &'static str {
        match self {
            Self::ComponentCompile { .. } | Self::EmptyComponentOutput => {
                "Component compilation error"
            }
        }
    }
}
