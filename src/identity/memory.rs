use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{CodeKind, Identity, IdentityStore, OutstandingCode, StoreError};

/// In-process store for local runs and tests.
///
/// Each call takes the lock once, which gives the same per-operation
/// atomicity as a database transaction.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<String, Identity>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.identities.read().await.is_empty()
    }

    async fn mutate<F>(&self, id: &str, apply: F) -> Result<Identity, StoreError>
    where
        F: FnOnce(&mut Identity) + Send,
    {
        let mut guard = self.identities.write().await;
        let identity = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        apply(identity);
        Ok(identity.clone())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn fetch_identity(&self, id: &str) -> Result<Identity, StoreError> {
        self.identities
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn fetch_identity_by_email_or_id(&self, key: &str) -> Result<Identity, StoreError> {
        let guard = self.identities.read().await;
        if let Some(identity) = guard.get(key) {
            return Ok(identity.clone());
        }
        guard
            .values()
            .find(|identity| identity.email.eq_ignore_ascii_case(key))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_identity(&self, identity: Identity) -> Result<Identity, StoreError> {
        let mut guard = self.identities.write().await;
        let taken = guard.contains_key(&identity.id)
            || guard
                .values()
                .any(|existing| existing.email.eq_ignore_ascii_case(&identity.email));
        if taken {
            return Err(StoreError::Conflict);
        }
        guard.insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<Identity, StoreError> {
        self.mutate(id, |identity| {
            identity.password_hash = password_hash.to_string();
            identity.recover_code = None;
        })
        .await
    }

    async fn update_totp(
        &self,
        id: &str,
        encrypted_secret: Option<String>,
        required: bool,
    ) -> Result<Identity, StoreError> {
        self.mutate(id, |identity| {
            identity.totp_secret = encrypted_secret;
            identity.totp_required = required;
        })
        .await
    }

    async fn update_outstanding_code(
        &self,
        id: &str,
        kind: CodeKind,
        code: OutstandingCode,
    ) -> Result<Identity, StoreError> {
        self.mutate(id, |identity| {
            *identity.outstanding_code_mut(kind) = Some(code);
        })
        .await
    }

    async fn clear_outstanding_code(
        &self,
        id: &str,
        kind: CodeKind,
        expected_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut guard = self.identities.write().await;
        let identity = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        let slot = identity.outstanding_code_mut(kind);
        if slot.as_ref().map(|code| code.hash.as_str()) == Some(expected_hash) {
            *slot = None;
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete_identity(&self, id: &str, expected_hash: &str) -> Result<bool, StoreError> {
        let mut guard = self.identities.write().await;
        let identity = guard.get(id).ok_or(StoreError::NotFound)?;
        if !holds_code(identity, CodeKind::Delete, expected_hash) {
            return Ok(false);
        }
        guard.remove(id);
        Ok(true)
    }

    async fn update_email(
        &self,
        id: &str,
        email: &str,
        expected_hash: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let mut guard = self.identities.write().await;
        let identity = guard.get(id).ok_or(StoreError::NotFound)?;
        if !holds_code(identity, CodeKind::Email, expected_hash) {
            return Ok(None);
        }
        let taken = guard
            .values()
            .any(|other| other.id != id && other.email.eq_ignore_ascii_case(email));
        if taken {
            return Err(StoreError::Conflict);
        }
        let identity = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        identity.email = email.to_string();
        identity.email_confirmed = true;
        identity.email_code = None;
        Ok(Some(identity.clone()))
    }
}

fn holds_code(identity: &Identity, kind: CodeKind, expected_hash: &str) -> bool {
    identity
        .outstanding_code(kind)
        .is_some_and(|code| code.hash == expected_hash)
}
