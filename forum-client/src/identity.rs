use std::sync::Arc;

use forum_api::{validate_string, Subject, SubjectId, ANONYMOUS_NAME};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;

use crate::{Error, LocalStorage, Result};

pub const ANON_ID_KEY: &str = "anon_id";
pub const ANON_NAME_KEY: &str = "anon_name";

const ANON_ID_PREFIX: &str = "anon-";
const ANON_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ANON_ID_LEN: usize = 8;

pub trait IdentityProvider: Send + Sync {
    /// None when nobody is signed in
    fn current_subject(&self) -> Option<Subject>;

    /// Receives the new subject every time somebody signs in or out
    fn identity_changes(&self) -> mpsc::UnboundedReceiver<Option<Subject>>;
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for Arc<T> {
    fn current_subject(&self) -> Option<Subject> {
        (**self).current_subject()
    }

    fn identity_changes(&self) -> mpsc::UnboundedReceiver<Option<Subject>> {
        (**self).identity_changes()
    }
}

/// Identity provider whose subject is set from the outside
pub struct StaticIdentity(Mutex<StaticInner>);

struct StaticInner {
    subject: Option<Subject>,
    listeners: Vec<mpsc::UnboundedSender<Option<Subject>>>,
}

impl StaticIdentity {
    pub fn signed_out() -> StaticIdentity {
        StaticIdentity(Mutex::new(StaticInner {
            subject: None,
            listeners: Vec::new(),
        }))
    }

    pub fn signed_in(subject: Subject) -> StaticIdentity {
        let this = StaticIdentity::signed_out();
        this.0.lock().subject = Some(subject);
        this
    }

    pub fn sign_in(&self, subject: Subject) {
        self.set(Some(subject))
    }

    pub fn sign_out(&self) {
        self.set(None)
    }

    fn set(&self, subject: Option<Subject>) {
        let mut inner = self.0.lock();
        inner.subject = subject.clone();
        inner
            .listeners
            .retain_mut(|l| matches!(l.send(subject.clone()), Ok(())));
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_subject(&self) -> Option<Subject> {
        self.0.lock().subject.clone()
    }

    fn identity_changes(&self) -> mpsc::UnboundedReceiver<Option<Subject>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.0.lock().listeners.push(sender);
        receiver
    }
}

/// The identity an action gets attributed to
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Actor {
    pub id: SubjectId,
    pub username: String,
    pub anonymous: bool,
}

/// Resolves the acting subject: the signed-in one if any, otherwise a
/// pseudo-anonymous identity kept in local storage
pub struct IdentityResolver {
    provider: Box<dyn IdentityProvider>,
    anonymous_storage: Option<Box<dyn LocalStorage>>,
}

impl IdentityResolver {
    pub fn new<P, L>(provider: P, storage: L) -> IdentityResolver
    where
        P: 'static + IdentityProvider,
        L: 'static + LocalStorage,
    {
        IdentityResolver {
            provider: Box::new(provider),
            anonymous_storage: Some(Box::new(storage)),
        }
    }

    /// Signed-out users get no identity at all, and thus cannot act
    pub fn authenticated_only<P: 'static + IdentityProvider>(provider: P) -> IdentityResolver {
        IdentityResolver {
            provider: Box::new(provider),
            anonymous_storage: None,
        }
    }

    pub fn current_subject(&self) -> Option<Subject> {
        self.provider.current_subject()
    }

    pub fn identity_changes(&self) -> mpsc::UnboundedReceiver<Option<Subject>> {
        self.provider.identity_changes()
    }

    /// The local pseudo-anonymous id, generated and persisted on first use
    pub fn anonymous_id(&self) -> anyhow::Result<Option<SubjectId>> {
        let storage = match &self.anonymous_storage {
            None => return Ok(None),
            Some(s) => s,
        };
        if let Some(id) = storage.get(ANON_ID_KEY)? {
            return Ok(Some(SubjectId(id)));
        }
        let id = generate_anonymous_id();
        storage.set(ANON_ID_KEY, &id)?;
        tracing::info!(%id, "generated local anonymous identity");
        Ok(Some(SubjectId(id)))
    }

    /// Id of whoever is acting right now, if anyone can be identified
    pub fn subject_id(&self) -> Option<SubjectId> {
        if let Some(s) = self.provider.current_subject() {
            return Some(s.id);
        }
        match self.anonymous_id() {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(?err, "failed recovering local anonymous identity");
                None
            }
        }
    }

    /// Resolves who is posting, and under which name.
    ///
    /// The name is the first available of: `label`, the display name, the
    /// email, the label an anonymous user chose earlier, and "Anonymous". A
    /// label given by an anonymous user is remembered for next time.
    pub fn actor(&self, label: Option<&str>) -> Result<Actor> {
        let label = label.map(str::trim).filter(|l| !l.is_empty());
        if let Some(l) = label {
            validate_string(l)?;
        }
        if let Some(subject) = self.provider.current_subject() {
            let username = label
                .map(String::from)
                .or(subject.display_name)
                .or(subject.email)
                .unwrap_or_else(|| String::from(ANONYMOUS_NAME));
            return Ok(Actor {
                id: subject.id,
                username,
                anonymous: false,
            });
        }

        let id = self
            .anonymous_id()
            .unwrap_or_else(|err| {
                tracing::error!(?err, "failed recovering local anonymous identity");
                None
            })
            .ok_or_else(Error::missing_subject)?;
        let storage = match &self.anonymous_storage {
            Some(s) => s,
            None => return Err(Error::missing_subject()),
        };
        let username = match label {
            Some(l) => {
                if let Err(err) = storage.set(ANON_NAME_KEY, l) {
                    tracing::warn!(?err, "failed remembering anonymous display name");
                }
                String::from(l)
            }
            None => storage
                .get(ANON_NAME_KEY)
                .unwrap_or_else(|err| {
                    tracing::warn!(?err, "failed recovering anonymous display name");
                    None
                })
                .unwrap_or_else(|| String::from(ANONYMOUS_NAME)),
        };
        Ok(Actor {
            id,
            username,
            anonymous: true,
        })
    }
}

fn generate_anonymous_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ANON_ID_LEN)
        .map(|_| ANON_ID_ALPHABET[rng.gen_range(0..ANON_ID_ALPHABET.len())] as char)
        .collect();
    format!("{ANON_ID_PREFIX}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;

    fn alice() -> Subject {
        Subject {
            id: SubjectId::from("alice-uid"),
            display_name: Some(String::from("Alice")),
            email: Some(String::from("alice@example.org")),
        }
    }

    #[test]
    fn anonymous_id_is_stable_across_sessions() {
        let storage = Arc::new(MemoryStorage::new());
        let first = IdentityResolver::new(StaticIdentity::signed_out(), storage.clone());
        let id = first.subject_id().unwrap();
        assert!(id.as_str().starts_with(ANON_ID_PREFIX));
        assert_eq!(id.as_str().len(), ANON_ID_PREFIX.len() + ANON_ID_LEN);

        let second = IdentityResolver::new(StaticIdentity::signed_out(), storage);
        assert_eq!(second.subject_id(), Some(id));
    }

    #[test]
    fn signed_in_subject_wins() {
        let r = IdentityResolver::new(StaticIdentity::signed_in(alice()), MemoryStorage::new());
        assert_eq!(r.subject_id(), Some(alice().id));
        let actor = r.actor(None).unwrap();
        assert_eq!(actor.username, "Alice");
        assert!(!actor.anonymous);
        assert_eq!(r.actor(Some("  Al ")).unwrap().username, "Al");
    }

    #[test]
    fn username_falls_back_to_email() {
        let mut s = alice();
        s.display_name = None;
        let r = IdentityResolver::new(StaticIdentity::signed_in(s), MemoryStorage::new());
        assert_eq!(r.actor(Some("   ")).unwrap().username, "alice@example.org");
    }

    #[test]
    fn anonymous_label_is_remembered() {
        let storage = Arc::new(MemoryStorage::new());
        let r = IdentityResolver::new(StaticIdentity::signed_out(), storage.clone());
        assert_eq!(r.actor(None).unwrap().username, ANONYMOUS_NAME);
        let actor = r.actor(Some("Zed")).unwrap();
        assert!(actor.anonymous);
        assert_eq!(actor.username, "Zed");
        assert_eq!(r.actor(None).unwrap().username, "Zed");
        assert_eq!(storage.get(ANON_NAME_KEY).unwrap().as_deref(), Some("Zed"));
    }

    #[test]
    fn authenticated_only_rejects_signed_out() {
        let r = IdentityResolver::authenticated_only(StaticIdentity::signed_out());
        assert_eq!(r.subject_id(), None);
        assert!(matches!(
            r.actor(None),
            Err(Error::Api(forum_api::Error::MissingSubject))
        ));
    }

    #[test]
    fn sign_in_and_out_are_notified() {
        let identity = Arc::new(StaticIdentity::signed_out());
        let r = IdentityResolver::new(identity.clone(), MemoryStorage::new());
        let mut changes = r.identity_changes();
        identity.sign_in(alice());
        identity.sign_out();
        assert_eq!(changes.try_recv().unwrap(), Some(alice()));
        assert_eq!(changes.try_recv().unwrap(), None);
        assert!(changes.try_recv().is_err());
    }
}
