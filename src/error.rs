use crate::resources::ResourceError;

/// Run-fatal errors. Everything else (bad tool calls, timeouts, failed
/// executions, unavailable docs) is recorded per command and never aborts
/// a run.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error(transparent)]
    ResourceStore(ResourceError),

    #[error("sandbox cannot spawn processes: {0}")]
    SandboxUnavailable(String),

    #[error("resource listing is disabled")]
    ListingDisabled,
}

impl From<ResourceError> for VerifyError {
    fn from(e: ResourceError) -> Self {
        match e {
            ResourceError::NotFound(name) => VerifyError::ResourceNotFound(name),
            other => VerifyError::ResourceStore(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_resource_maps_to_resource_not_found() {
        let err: VerifyError = ResourceError::NotFound("git".to_string()).into();
        assert!(matches!(err, VerifyError::ResourceNotFound(ref n) if n == "git"));
        assert_eq!(err.to_string(), "resource not found: git");
    }

    #[test]
    fn test_store_errors_pass_through() {
        let err: VerifyError = ResourceError::RootMissing(PathBuf::from("/nope")).into();
        assert!(matches!(err, VerifyError::ResourceStore(_)));
        assert!(err.to_string().contains("/nope"));
    }
}
