//! Proxy authorization
//!
//! [`AuthGate`] turns the `Proxy-Authorization` header of one request into an
//! [`AuthDecision`], using a [`CredentialStore`] for the login and a
//! [`PasswordVerifier`] for the password. Client-side failures all come back
//! as [`AuthDecision::Denied`] with a generic reason; only a failure to read
//! the credential store is reported as [`AuthDecision::Error`].

mod store;
mod verifier;

pub use store::{Credential, CredentialStore, HtpasswdFile};
pub use verifier::{
    apr1_hash, sha1_hash, Apr1, Bcrypt, HashScheme, PasswordVerifier, Sha1Digest, APR1_LENGTH,
    BCRYPT_LENGTH, SHA1_LENGTH,
};

use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use hyper::header::{HeaderValue, PROXY_AUTHORIZATION};
use hyper::Request;
use std::io;
use std::sync::Arc;

/// Standard alphabet and padding, tolerating non-zero trailing bits.
const BASIC_PAYLOAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Why a request was refused. The rendered message is what the client sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("authorization credentials is not provided")]
    MissingHeader,

    #[error("can't decode the authorization header. Service using the Basic Authorization")]
    DecodeFailure,

    #[error("wrong authorization credentials")]
    MalformedCredentials,

    #[error("user or password not match")]
    UserNotFound,

    #[error("user or password not match")]
    PasswordMismatch,
}

/// Outcome of authorizing one request.
#[derive(Debug)]
pub enum AuthDecision {
    Allowed,
    Denied(Denial),
    /// The credential store could not be read.
    Error(io::Error),
}

impl AuthDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthDecision::Allowed)
    }

    /// Client-facing reason for a denial.
    pub fn reason(&self) -> Option<String> {
        match self {
            AuthDecision::Denied(denial) => Some(denial.to_string()),
            _ => None,
        }
    }
}

/// Per-request Basic authorization against a credential store.
pub struct AuthGate {
    store: Arc<dyn CredentialStore>,
    verifier: PasswordVerifier,
    span: tracing::Span,
}

impl AuthGate {
    pub fn new(store: Arc<dyn CredentialStore>, span: tracing::Span) -> Self {
        Self {
            store,
            verifier: PasswordVerifier::default(),
            span,
        }
    }

    pub fn with_verifier(mut self, verifier: PasswordVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// Gate backed by an htpasswd file; the store shares the gate's span.
    pub fn from_htpasswd(path: impl Into<std::path::PathBuf>, span: tracing::Span) -> Self {
        let store = HtpasswdFile::new(path, span.clone());
        Self::new(Arc::new(store), span)
    }

    /// Authorize a request from its `Proxy-Authorization` header.
    pub fn authorize<B>(&self, req: &Request<B>) -> AuthDecision {
        self.authorize_header(req.headers().get(PROXY_AUTHORIZATION))
    }

    /// Authorize from a raw `Proxy-Authorization` header value.
    pub fn authorize_header(&self, header: Option<&HeaderValue>) -> AuthDecision {
        let _enter = self.span.enter();
        tracing::debug!("authorizing the client");

        let (login, password) = match extract_credentials(header) {
            Ok(credentials) => credentials,
            Err(denial) => {
                tracing::error!(reason = %denial, "rejecting malformed authorization");
                return AuthDecision::Denied(denial);
            }
        };

        tracing::info!(user = %login, "checking credentials");

        let credential = match self.store.lookup(&login) {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                tracing::error!(user = %login, "user not found");
                return AuthDecision::Denied(Denial::UserNotFound);
            }
            Err(e) => {
                tracing::error!(user = %login, error = %e, "credential store unreadable");
                return AuthDecision::Error(e);
            }
        };

        if !self.verifier.verify(&credential.password_hash, &password) {
            tracing::error!(user = %login, "password mismatch");
            return AuthDecision::Denied(Denial::PasswordMismatch);
        }

        AuthDecision::Allowed
    }
}

/// Decode `Basic <base64(login:password)>` into its two fields.
///
/// Every `Basic ` occurrence is removed, not just a leading one, and the
/// decoded text must split on `:` into exactly two fields, so passwords
/// containing a colon are refused.
pub fn extract_credentials(header: Option<&HeaderValue>) -> Result<(String, String), Denial> {
    let header = match header {
        Some(value) if !value.is_empty() => value,
        _ => return Err(Denial::MissingHeader),
    };

    let header = header.to_str().map_err(|_| Denial::DecodeFailure)?;
    let encoded = header.replace("Basic ", "");
    let decoded = BASIC_PAYLOAD
        .decode(encoded)
        .map_err(|_| Denial::DecodeFailure)?;
    let decoded = String::from_utf8(decoded).map_err(|_| Denial::DecodeFailure)?;

    let fields: Vec<&str> = decoded.split(':').collect();
    match fields.as_slice() {
        [login, password] => Ok((login.to_string(), password.to_string())),
        _ => Err(Denial::MalformedCredentials),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SHA_ADMIN: &str = "{SHA}0DPiKuNIrrVmD8IUCuw1hQxNqZc=";

    /// In-memory store that counts lookups.
    #[derive(Default)]
    struct MemoryStore {
        entries: HashMap<String, String>,
        broken: bool,
        lookups: AtomicUsize,
    }

    impl MemoryStore {
        fn with(login: &str, hash: &str) -> Self {
            let mut store = Self::default();
            store.entries.insert(login.to_string(), hash.to_string());
            store
        }
    }

    impl CredentialStore for MemoryStore {
        fn lookup(&self, login: &str) -> io::Result<Option<Credential>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            Ok(self.entries.get(login).map(|hash| Credential {
                login: login.to_string(),
                password_hash: hash.clone(),
            }))
        }
    }

    fn basic(raw: &str) -> HeaderValue {
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap()
    }

    fn gate(store: MemoryStore) -> (Arc<MemoryStore>, AuthGate) {
        let store = Arc::new(store);
        let gate = AuthGate::new(store.clone(), tracing::Span::none());
        (store, gate)
    }

    fn reason(decision: &AuthDecision) -> String {
        decision.reason().expect("expected a denial")
    }

    #[test]
    fn test_missing_header() {
        let (store, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));
        let decision = gate.authorize_header(None);
        assert!(matches!(decision, AuthDecision::Denied(Denial::MissingHeader)));
        assert_eq!(reason(&decision), "authorization credentials is not provided");
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_header() {
        let (_, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));
        let decision = gate.authorize_header(Some(&HeaderValue::from_static("")));
        assert!(matches!(decision, AuthDecision::Denied(Denial::MissingHeader)));
    }

    #[test]
    fn test_invalid_base64() {
        let (_, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));
        let value = HeaderValue::from_static("Basic !!!not-base64");
        let decision = gate.authorize_header(Some(&value));
        assert!(matches!(decision, AuthDecision::Denied(Denial::DecodeFailure)));
        assert!(reason(&decision).starts_with("can't decode the authorization header"));
    }

    #[test]
    fn test_non_utf8_payload() {
        let (_, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));
        let encoded = base64::engine::general_purpose::STANDARD.encode([0xff, 0xfe, b':', b'a']);
        let value = HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap();
        let decision = gate.authorize_header(Some(&value));
        assert!(matches!(decision, AuthDecision::Denied(Denial::DecodeFailure)));
    }

    #[test]
    fn test_trailing_bits_are_tolerated() {
        let (_, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));
        // "YWRtaW46YWRtaW4=" with non-zero trailing bits in the last symbol
        let value = HeaderValue::from_static("Basic YWRtaW46YWRtaW5=");
        assert_eq!(
            extract_credentials(Some(&value)).unwrap(),
            ("admin".to_string(), "admin".to_string())
        );
        assert!(gate.authorize_header(Some(&value)).is_allowed());
    }

    #[test]
    fn test_missing_padding_rejected() {
        let value = HeaderValue::from_static("Basic YWRtaW46YWRtaW4");
        assert_eq!(extract_credentials(Some(&value)), Err(Denial::DecodeFailure));
    }

    #[test]
    fn test_missing_basic_prefix_still_decodes() {
        let (_, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));
        let encoded = base64::engine::general_purpose::STANDARD.encode("admin:admin");
        let decision = gate.authorize_header(Some(&HeaderValue::from_str(&encoded).unwrap()));
        assert!(decision.is_allowed());
    }

    #[test]
    fn test_lowercase_scheme_is_not_stripped() {
        let (_, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));
        let encoded = base64::engine::general_purpose::STANDARD.encode("admin:admin");
        let value = HeaderValue::from_str(&format!("basic {}", encoded)).unwrap();
        let decision = gate.authorize_header(Some(&value));
        assert!(matches!(decision, AuthDecision::Denied(Denial::DecodeFailure)));
    }

    #[test]
    fn test_password_with_colon_rejected() {
        let (store, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));
        let decision = gate.authorize_header(Some(&basic("admin:pass:word")));
        assert!(matches!(decision, AuthDecision::Denied(Denial::MalformedCredentials)));
        assert_eq!(reason(&decision), "wrong authorization credentials");
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_colon_rejected() {
        let (_, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));
        let decision = gate.authorize_header(Some(&basic("admin")));
        assert!(matches!(decision, AuthDecision::Denied(Denial::MalformedCredentials)));
    }

    #[test]
    fn test_allowed() {
        let (_, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));
        assert!(gate.authorize_header(Some(&basic("admin:admin"))).is_allowed());
    }

    #[test]
    fn test_wrong_password_and_unknown_user_look_the_same() {
        let (_, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));

        let wrong = gate.authorize_header(Some(&basic("admin:wrong")));
        let ghost = gate.authorize_header(Some(&basic("ghost:anything")));

        assert!(matches!(wrong, AuthDecision::Denied(Denial::PasswordMismatch)));
        assert!(matches!(ghost, AuthDecision::Denied(Denial::UserNotFound)));
        assert_eq!(reason(&wrong), "user or password not match");
        assert_eq!(reason(&wrong), reason(&ghost));
    }

    #[test]
    fn test_store_failure_is_error() {
        let (_, gate) = gate(MemoryStore {
            broken: true,
            ..MemoryStore::default()
        });
        let decision = gate.authorize_header(Some(&basic("admin:admin")));
        match decision {
            AuthDecision::Error(e) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("expected store error, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_hash_is_mismatch() {
        let (_, gate) = gate(MemoryStore::with("admin", "admin"));
        let decision = gate.authorize_header(Some(&basic("admin:admin")));
        assert!(matches!(decision, AuthDecision::Denied(Denial::PasswordMismatch)));
    }

    #[test]
    fn test_with_verifier_restricts_schemes() {
        let bcrypt_hash = bcrypt::hash("admin", 4).unwrap();
        let mut store = MemoryStore::with("admin", SHA_ADMIN);
        store.entries.insert("legacy".to_string(), bcrypt_hash);
        let gate = AuthGate::new(Arc::new(store), tracing::Span::none())
            .with_verifier(PasswordVerifier::new(vec![Box::new(Sha1Digest)]));

        assert!(gate.authorize_header(Some(&basic("admin:admin"))).is_allowed());
        assert!(matches!(
            gate.authorize_header(Some(&basic("legacy:admin"))),
            AuthDecision::Denied(Denial::PasswordMismatch)
        ));
    }

    #[test]
    fn test_authorize_reads_proxy_authorization() {
        let (_, gate) = gate(MemoryStore::with("admin", SHA_ADMIN));
        let req = Request::builder()
            .uri("http://example.com/")
            .header(PROXY_AUTHORIZATION, basic("admin:admin"))
            .body(())
            .unwrap();
        assert!(gate.authorize(&req).is_allowed());

        let req = Request::builder()
            .uri("http://example.com/")
            .header("authorization", basic("admin:admin"))
            .body(())
            .unwrap();
        assert!(matches!(
            gate.authorize(&req),
            AuthDecision::Denied(Denial::MissingHeader)
        ));
    }

    #[test]
    fn test_htpasswd_end_to_end() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".htpasswd");
        std::fs::write(&path, format!("admin:{}\n", SHA_ADMIN)).unwrap();
        let gate = AuthGate::from_htpasswd(&path, tracing::Span::none());

        assert!(gate.authorize_header(Some(&basic("admin:admin"))).is_allowed());
        assert_eq!(
            reason(&gate.authorize_header(Some(&basic("admin:wrong")))),
            "user or password not match"
        );
        assert_eq!(
            reason(&gate.authorize_header(Some(&basic("ghost:anything")))),
            "user or password not match"
        );

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            gate.authorize_header(Some(&basic("admin:admin"))),
            AuthDecision::Error(_)
        ));
    }
}
