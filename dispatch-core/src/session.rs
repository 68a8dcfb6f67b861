use crate::error::{DispatchError, Result};
use crate::records::Operator;
use crate::store::Store;
use std::path::{Path, PathBuf};

/// The signed-in operator, persisted as JSON so a restart restores it.
/// Holds at most one operator. There is no expiry or refresh.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    current: Option<Operator>,
}

impl SessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let current = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Operator>(&raw) {
                Ok(operator) => Some(operator),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "discarding unreadable session");
                    None
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        Ok(Self { path, current })
    }

    pub fn current(&self) -> Option<&Operator> {
        self.current.as_ref()
    }

    pub fn require_operator(&self) -> Result<&Operator> {
        self.current.as_ref().ok_or(DispatchError::Unauthenticated)
    }

    /// Resolves the operator by email and persists the session. Credential
    /// checks belong to the hosted identity provider.
    pub fn sign_in(&mut self, store: &Store, email: &str) -> Result<Operator> {
        let operator = store
            .operator_by_email(email)?
            .ok_or_else(|| DispatchError::Validation("invalid email or password".into()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string(&operator)?)?;
        tracing::info!(operator_id = %operator.id, "operator signed in");

        self.current = Some(operator.clone());
        Ok(operator)
    }

    pub fn sign_out(&mut self) -> Result<()> {
        if let Some(operator) = self.current.take() {
            tracing::info!(operator_id = %operator.id, "operator signed out");
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
