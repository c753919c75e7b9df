use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("WebDriver error '{code}': {message}")]
    WebDriver { code: String, message: String },

    #[error("Element is detached from the view hierarchy: {0}")]
    ElementDetached(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl AutomationError {
    /// True for the "element missing / not actionable yet" family that a
    /// retry (possibly after clearing a popup) can fix.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AutomationError::ElementNotFound(_)
                | AutomationError::Timeout(_)
                | AutomationError::ElementDetached(_)
                | AutomationError::ElementNotVisible(_)
                | AutomationError::ElementNotEnabled(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_the_lookup_family() {
        assert!(AutomationError::Timeout("x".into()).is_transient());
        assert!(AutomationError::ElementNotFound("x".into()).is_transient());
        assert!(AutomationError::ElementDetached("x".into()).is_transient());
        assert!(!AutomationError::PlatformError("x".into()).is_transient());
        assert!(!AutomationError::InvalidSelector("x".into()).is_transient());
    }
}
