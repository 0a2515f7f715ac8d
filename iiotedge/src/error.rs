use thiserror::Error;

use iiot_core::error::CoreError;

use crate::azure::AzureError;

/// A specialized [`Result`] type for the CLI.
pub type Result<T> = std::result::Result<T, CliError>;

/// Fatal-error taxonomy of the tool. There is no recoverable tier: every
/// variant terminates the run, the only distinction is the exit code.
///
/// Exit code 2 covers argument and filesystem preconditions; everything
/// else (environment, external commands, data validation) exits with 1.
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid argument combination or filesystem precondition.
    #[error("{0}")]
    Precondition(String),

    /// Unsupported OS, missing network or similar environment problems.
    #[error("{0}")]
    Environment(String),

    /// A shelled-out `az` step failed or produced unusable output.
    #[error(transparent)]
    Azure(#[from] AzureError),

    /// Data validation failure in one of the transformation passes.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Failed to fetch the topology description.
    #[error("failed to fetch the topology description: {0}")]
    TopologyFetch(#[from] reqwest::Error),

    /// Underlying IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Precondition(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preconditions_exit_with_two_everything_else_with_one() {
        assert_eq!(CliError::Precondition("bad".to_string()).exit_code(), 2);
        assert_eq!(CliError::Environment("bad".to_string()).exit_code(), 1);
        assert_eq!(
            CliError::Core(CoreError::UnsupportedTopologyVersion).exit_code(),
            1
        );
        assert_eq!(
            CliError::Azure(AzureError::CreateFailed("deployment")).exit_code(),
            1
        );
    }
}
