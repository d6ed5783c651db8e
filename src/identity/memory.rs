use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::identity::record::{Identity, IdentityKind};
use crate::identity::store::{IdentityStore, NewIdentity, StoreError};

/// In-memory identity store. Backs `AppState::fake()` and the core-flow
/// tests; enforces the same per-kind email uniqueness the Postgres unique
/// index does.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    records: Mutex<HashMap<Uuid, Identity>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_where<F>(&self, predicate: F) -> Option<Identity>
    where
        F: Fn(&Identity) -> bool,
    {
        let records = self.records.lock().expect("store lock poisoned");
        let mut matches: Vec<&Identity> = records.values().filter(|i| predicate(i)).collect();
        // Standard before expert, mirroring the Postgres adapter's ordering.
        matches.sort_by_key(|i| i.kind != IdentityKind::Standard);
        matches.first().map(|i| (*i).clone())
    }

    fn mutate<F>(&self, id: Uuid, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Identity),
    {
        let mut records = self.records.lock().expect("store lock poisoned");
        let identity = records.get_mut(&id).ok_or(StoreError::NotFound)?;
        apply(identity);
        identity.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let mut records = self.records.lock().expect("store lock poisoned");
        if records
            .values()
            .any(|i| i.kind == new.kind && i.email == new.email)
        {
            return Err(StoreError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let identity = Identity {
            id: Uuid::new_v4(),
            kind: new.kind,
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            is_verified: new.is_verified,
            is_active: true,
            verification_token: new.verification_token,
            verification_expires_at: new.verification_expires_at,
            password_reset_token: None,
            reset_token_expires_at: None,
            refresh_token: None,
            refresh_token_expires_at: None,
            last_login_at: None,
            auth_provider: new.auth_provider,
            provider_id: new.provider_id,
            created_at: now,
            updated_at: now,
        };
        records.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.find_where(|i| i.id == id))
    }

    async fn find_by_email(
        &self,
        kind: IdentityKind,
        email: &str,
    ) -> Result<Option<Identity>, StoreError> {
        Ok(self.find_where(|i| i.kind == kind && i.email == email))
    }

    async fn find_by_email_any(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.find_where(|i| i.email == email))
    }

    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Identity>, StoreError> {
        Ok(self.find_where(|i| i.verification_token.as_deref() == Some(token)))
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.find_where(|i| i.password_reset_token.as_deref() == Some(token)))
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.find_where(|i| i.refresh_token.as_deref() == Some(token)))
    }

    async fn find_by_provider(
        &self,
        kind: IdentityKind,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<Identity>, StoreError> {
        Ok(self.find_where(|i| {
            i.kind == kind
                && i.auth_provider.as_deref() == Some(provider)
                && i.provider_id.as_deref() == Some(provider_id)
        }))
    }

    async fn mark_verified(&self, id: Uuid) -> Result<(), StoreError> {
        self.mutate(id, |i| {
            i.is_verified = true;
            i.verification_token = None;
            i.verification_expires_at = None;
        })
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.mutate(id, |i| {
            i.password_reset_token = Some(token.to_owned());
            i.reset_token_expires_at = Some(expires_at);
        })
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        self.mutate(id, |i| {
            i.password_hash = Some(password_hash.to_owned());
            i.password_reset_token = None;
            i.reset_token_expires_at = None;
        })
    }

    async fn set_refresh_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.mutate(id, |i| {
            i.refresh_token = Some(token.to_owned());
            i.refresh_token_expires_at = Some(expires_at);
        })
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError> {
        self.mutate(id, |i| {
            i.last_login_at = Some(OffsetDateTime::now_utc());
        })
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("store lock poisoned");
        records.remove(&id).ok_or(StoreError::NotFound)?;
        Ok(())
    }
}
