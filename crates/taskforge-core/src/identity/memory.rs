//! In-process [`IdentityProvider`] with email/password accounts.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{AuthError, Identity, IdentityListener, IdentityProvider};
use crate::config::{AuthConfig, DEFAULT_MIN_PASSWORD_LEN};
use crate::listener::{ListenerHandle, lock};
use crate::store::memory::random_id;

const UID_LEN: usize = 28;

struct Account {
    uid: Identity,
    password: String,
}

struct State {
    accounts: HashMap<String, Account>,
    current: Option<Identity>,
    listeners: BTreeMap<u64, Arc<Mutex<IdentityListener>>>,
    next_listener: u64,
    min_password_len: usize,
    rng: StdRng,
}

struct Inner {
    state: Mutex<State>,
}

/// Shared in-memory account directory with a single active session.
/// Clones share state.
#[derive(Clone)]
pub struct InMemoryIdentityProvider {
    inner: Arc<Inner>,
}

impl InMemoryIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Provider whose issued uids are reproducible for `seed`.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    accounts: HashMap::new(),
                    current: None,
                    listeners: BTreeMap::new(),
                    next_listener: 0,
                    min_password_len: DEFAULT_MIN_PASSWORD_LEN,
                    rng,
                }),
            }),
        }
    }

    /// Override the minimum password length enforced on sign-up.
    #[must_use]
    pub fn with_min_password_len(self, min_len: usize) -> Self {
        lock(&self.inner.state).min_password_len = min_len;
        self
    }

    /// Apply the `[auth]` section of the user config.
    #[must_use]
    pub fn configured(self, auth: &AuthConfig) -> Self {
        self.with_min_password_len(auth.min_password_len)
    }

    /// Identity of the active session.
    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        lock(&self.inner.state).current.clone()
    }

    fn switch_to(&self, next: Option<Identity>) {
        let changed = {
            let mut state = lock(&self.inner.state);
            if state.current == next {
                false
            } else {
                state.current = next;
                true
            }
        };
        if changed {
            self.inner.notify_all();
        }
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("InMemoryIdentityProvider")
            .field("accounts", &state.accounts.len())
            .field("current", &state.current)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn notify_all(&self) {
        let listeners: Vec<_> = lock(&self.state).listeners.values().cloned().collect();
        for listener in listeners {
            self.deliver(&listener);
        }
    }

    fn deliver(&self, listener: &Mutex<IdentityListener>) {
        let mut callback = lock(listener);
        let current = lock(&self.state).current.clone();
        let callback: &mut (dyn FnMut(Option<Identity>) + Send) = &mut **callback;
        callback(current);
    }
}

fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let email = raw.trim().to_ascii_lowercase();
    let well_formed = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.is_empty()
            && !domain.contains('@')
            && !email.chars().any(char::is_whitespace)
    });
    if well_formed {
        Ok(email)
    } else {
        Err(AuthError::InvalidEmail(raw.trim().to_string()))
    }
}

impl IdentityProvider for InMemoryIdentityProvider {
    fn subscribe(&self, listener: IdentityListener) -> ListenerHandle {
        let (key, listener) = {
            let mut state = lock(&self.inner.state);
            let key = state.next_listener;
            state.next_listener += 1;
            let listener = Arc::new(Mutex::new(listener));
            state.listeners.insert(key, Arc::clone(&listener));
            (key, listener)
        };

        self.inner.deliver(&listener);

        let weak = Arc::downgrade(&self.inner);
        ListenerHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner.state).listeners.remove(&key);
            }
        })
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email)?;
        let uid = {
            let state = lock(&self.inner.state);
            match state.accounts.get(&email) {
                Some(account) if account.password == password => account.uid.clone(),
                _ => return Err(AuthError::InvalidCredentials),
            }
        };
        tracing::info!(uid = %uid, "signed in");
        self.switch_to(Some(uid.clone()));
        Ok(uid)
    }

    fn sign_up_with_password(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email)?;
        let uid = {
            let mut state = lock(&self.inner.state);
            if password.chars().count() < state.min_password_len {
                return Err(AuthError::WeakPassword {
                    min_len: state.min_password_len,
                });
            }
            if state.accounts.contains_key(&email) {
                return Err(AuthError::EmailInUse(email));
            }
            let uid = Identity::new(random_id(&mut state.rng, UID_LEN));
            state.accounts.insert(
                email,
                Account {
                    uid: uid.clone(),
                    password: password.to_string(),
                },
            );
            uid
        };
        tracing::info!(uid = %uid, "account created");
        self.switch_to(Some(uid.clone()));
        Ok(uid)
    }

    fn sign_out(&self) {
        if self.current().is_some() {
            tracing::info!("signed out");
        }
        self.switch_to(None);
    }
}
