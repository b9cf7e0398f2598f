//!
//! # Invitation notification
//!
//! Delivery of invitation emails is an external collaborator behind the
//! [`InvitationNotifier`] trait. Notification is strictly best-effort: a
//! delivery failure never rolls back the invitation's creation, it is
//! reported as a warning on the otherwise-successful response.

use std::fmt;

/// Everything a notifier needs to compose an invitation message.
#[derive(Debug, Clone)]
pub struct InvitationEmail {
    pub to: String,
    pub inviter_name: String,
    pub project_name: String,
    /// French display label of the offered role.
    pub role_label: String,
    /// Link of the form `{base_url}/invitations/accept/{token}`.
    pub accept_url: String,
    /// Whether an account already exists for the target email; the message
    /// differs between "log in and accept" and "register first".
    pub user_exists: bool,
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Notification failed: {}", self.0)
    }
}

pub trait InvitationNotifier: Send + Sync {
    fn send_invitation(&self, email: &InvitationEmail) -> Result<(), NotifyError>;
}

/// Default notifier: logs the invitation instead of delivering it. Stands in
/// for a real mail transport in development and tests.
pub struct LogNotifier;

impl InvitationNotifier for LogNotifier {
    fn send_invitation(&self, email: &InvitationEmail) -> Result<(), NotifyError> {
        log::info!(
            "Invitation to {} for project '{}' as {} ({}): {}",
            email.to,
            email.project_name,
            email.role_label,
            if email.user_exists {
                "existing account"
            } else {
                "new account"
            },
            email.accept_url
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_notifier_always_succeeds() {
        let email = InvitationEmail {
            to: "a@x.com".to_string(),
            inviter_name: "alice".to_string(),
            project_name: "Apollo".to_string(),
            role_label: "Membre".to_string(),
            accept_url: "http://localhost:4200/invitations/accept/tok".to_string(),
            user_exists: false,
        };
        assert!(LogNotifier.send_invitation(&email).is_ok());
    }
}
