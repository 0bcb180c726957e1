use shadow_core::error::CoreError;
use shadow_core::gateway::GatewayError;

/// Error returned by [`PracticeSession`](crate::PracticeSession) operations.
///
/// Refused user actions surface as [`CoreError::Conflict`]; persistence
/// failures keep the gateway's error so callers can tell a missing clip from
/// a flaky connection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl SessionError {
    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Core(CoreError::Conflict(msg) | CoreError::Validation(msg)) => msg.clone(),
            Self::Core(CoreError::NotFound { entity, .. }) => {
                format!("That {entity} could not be found")
            }
            Self::Core(CoreError::Internal(_)) => "Something went wrong".to_string(),
            Self::Gateway(GatewayError::NotFound { entity, .. }) => {
                format!("That {entity} could not be found")
            }
            Self::Gateway(GatewayError::Network(_)) => {
                "Could not reach the server, please try again".to_string()
            }
        }
    }
}
