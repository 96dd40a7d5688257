// 🪪 Session - explicit login context handed to every pipeline run
// Replaces a process-wide "logged in" flag: no session, no run.

use crate::authorization::ComplexRegistry;
use crate::config::LoginConfig;
use crate::error::{ReconError, Result};
use log::{info, warn};

/// Credentials as typed by the operator
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// An authenticated operator and the complexes they may process
#[derive(Debug, Clone)]
pub struct Session {
    username: String,
    registry: ComplexRegistry,
}

impl Session {
    /// Check credentials against the configured login and open a session
    pub fn login(
        login: &LoginConfig,
        credentials: &Credentials,
        registry: ComplexRegistry,
    ) -> Result<Self> {
        let valid = !login.username.is_empty()
            && credentials.username == login.username
            && credentials.password == login.password;

        if !valid {
            warn!("Rejected login for user '{}'", credentials.username);
            return Err(ReconError::AuthenticationFailed);
        }

        info!(
            "User '{}' logged in ({} authorized complexes)",
            credentials.username,
            registry.len()
        );
        Ok(Session {
            username: credentials.username.clone(),
            registry,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn registry(&self) -> &ComplexRegistry {
        &self.registry
    }
}
