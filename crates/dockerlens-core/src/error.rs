use thiserror::Error;

/// Failure classes for the external collaborators (container runtime,
/// scanner binary, AI endpoint, source host). Nothing in the analysis core
/// itself produces these; analyzer functions are total.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Image absent locally, or Dockerfile absent in the repository.
    #[error("not found: {0}")]
    NotFound(String),

    /// Daemon unreachable, binary missing or non-zero exit, endpoint down,
    /// or an unparsable payload.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// Auth or write-access failure against the source host. Callers treat
    /// this as a recoverable branch (fork workflow), not a hard stop.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A bounded wait was exhausted; the name says what was being awaited.
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = CollaboratorError::NotFound("image 'web:latest'".into());
        assert_eq!(err.to_string(), "not found: image 'web:latest'");

        let err = CollaboratorError::Timeout("fork readiness".into());
        assert!(err.to_string().contains("fork readiness"));
    }
}
