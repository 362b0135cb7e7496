//! Authentication interface
//!
//! The server consumes an already-verified identity. `MemoryAuthenticator`
//! is a process-local stand-in that keeps accounts in a map and compares
//! opaque secrets; credential hashing and durable accounts belong to a real
//! identity backend behind the same trait.

use crate::error::AuthError;
use rand::Rng;
use shared::PlayerId;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub id: PlayerId,
    pub username: String,
    pub email: String,
    pub credential_ref: String,
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> Result<PlayerIdentity, AuthError>;
    fn register(&self, credentials: &Credentials, email: &str) -> Result<PlayerIdentity, AuthError>;
}

struct Account {
    identity: PlayerIdentity,
    secret: String,
}

#[derive(Default)]
struct Accounts {
    /// Keyed by lowercased username
    by_name: HashMap<String, Account>,
    /// Every player id handed out so far
    ids: HashSet<PlayerId>,
}

#[derive(Default)]
pub struct MemoryAuthenticator {
    accounts: Mutex<Accounts>,
}

/// Draws ids until one is not in `taken`
fn unused_id(taken: &HashSet<PlayerId>, mut draw: impl FnMut() -> u32) -> PlayerId {
    loop {
        let id = format!("p{:08x}", draw());
        if !taken.contains(&id) {
            return id;
        }
    }
}

impl MemoryAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    fn valid_username(username: &str) -> bool {
        !username.is_empty()
            && username.len() <= 32
            && username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

impl Authenticator for MemoryAuthenticator {
    fn authenticate(&self, credentials: &Credentials) -> Result<PlayerIdentity, AuthError> {
        let key = credentials.username.to_ascii_lowercase();
        let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        let account = accounts
            .by_name
            .get(&key)
            .ok_or_else(|| AuthError::UnknownUser(credentials.username.clone()))?;

        if account.secret != credentials.secret {
            return Err(AuthError::BadPassword(credentials.username.clone()));
        }
        Ok(account.identity.clone())
    }

    fn register(&self, credentials: &Credentials, email: &str) -> Result<PlayerIdentity, AuthError> {
        if !Self::valid_username(&credentials.username) {
            return Err(AuthError::InvalidUsername(credentials.username.clone()));
        }

        let key = credentials.username.to_ascii_lowercase();
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        if accounts.by_name.contains_key(&key) {
            return Err(AuthError::UsernameTaken(credentials.username.clone()));
        }

        let mut rng = rand::thread_rng();
        let id = unused_id(&accounts.ids, || rng.gen::<u32>());
        accounts.ids.insert(id.clone());
        let identity = PlayerIdentity {
            id,
            username: credentials.username.clone(),
            email: email.to_string(),
            credential_ref: format!("cred-{:016x}", rng.gen::<u64>()),
        };

        accounts.by_name.insert(
            key,
            Account {
                identity: identity.clone(),
                secret: credentials.secret.clone(),
            },
        );
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(username: &str, secret: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            secret: secret.to_string(),
        }
    }

    #[test]
    fn test_register_then_authenticate() {
        let auth = MemoryAuthenticator::new();
        let registered = auth.register(&creds("alice", "pw"), "alice@example.com").unwrap();
        let identity = auth.authenticate(&creds("Alice", "pw")).unwrap();

        assert_eq!(identity, registered);
        assert_eq!(identity.email, "alice@example.com");
        assert!(identity.id.starts_with('p'));
    }

    #[test]
    fn test_authentication_failures() {
        let auth = MemoryAuthenticator::new();
        auth.register(&creds("alice", "pw"), "").unwrap();

        assert_eq!(
            auth.authenticate(&creds("alice", "nope")),
            Err(AuthError::BadPassword("alice".to_string()))
        );
        assert_eq!(
            auth.authenticate(&creds("bob", "pw")),
            Err(AuthError::UnknownUser("bob".to_string()))
        );
    }

    #[test]
    fn test_registration_rules() {
        let auth = MemoryAuthenticator::new();
        auth.register(&creds("alice", "pw"), "").unwrap();

        assert_eq!(
            auth.register(&creds("ALICE", "pw2"), ""),
            Err(AuthError::UsernameTaken("ALICE".to_string()))
        );
        assert!(matches!(
            auth.register(&creds("bad name", "pw"), ""),
            Err(AuthError::InvalidUsername(_))
        ));
    }

    #[test]
    fn test_player_ids_are_never_reused() {
        let auth = MemoryAuthenticator::new();
        let mut seen = HashSet::new();
        for i in 0..2_000 {
            let identity = auth.register(&creds(&format!("user{}", i), "pw"), "").unwrap();
            assert!(seen.insert(identity.id));
        }
    }

    #[test]
    fn test_unused_id_skips_taken_draws() {
        let mut taken = HashSet::new();
        taken.insert("p00000001".to_string());
        taken.insert("p00000002".to_string());

        let mut draws = [1u32, 2, 1, 3].into_iter();
        let id = unused_id(&taken, || draws.next().unwrap());
        assert_eq!(id, "p00000003");
        assert_eq!(draws.next(), None);
    }
}
