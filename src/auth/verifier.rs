//! Password verification against htpasswd hash encodings
//!
//! Stored hashes carry no explicit algorithm tag. The scheme is picked from
//! the length of the stored string alone:
//!
//! | length | scheme |
//! |--------|--------|
//! | 60     | bcrypt (`$2a$`, `$2b$`, `$2y$`) |
//! | 37     | APR1 (`$apr1$<8-char salt>$<22-char digest>`) |
//! | 33     | `{SHA}` + base64(SHA-1) |
//!
//! Anything else never verifies.

use base64::Engine;
use md5::{Digest, Md5};
use sha1::Sha1;

pub const BCRYPT_LENGTH: usize = 60;
pub const APR1_LENGTH: usize = 37;
pub const SHA1_LENGTH: usize = 33;

const APR1_MAGIC: &str = "$apr1$";
const APR1_MAX_SALT: usize = 8;
const SHA1_PREFIX: &str = "{SHA}";

/// crypt(3) base64 alphabet
const ITOA64: &[u8; 64] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// One stored-hash encoding.
pub trait HashScheme: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a stored hash has the shape this scheme handles.
    fn recognizes(&self, stored_hash: &str) -> bool;

    /// Check a candidate password. Malformed hashes yield `false`.
    fn verify(&self, stored_hash: &str, candidate: &str) -> bool;
}

/// bcrypt, delegated to the `bcrypt` crate.
pub struct Bcrypt;

impl HashScheme for Bcrypt {
    fn name(&self) -> &'static str {
        "bcrypt"
    }

    fn recognizes(&self, stored_hash: &str) -> bool {
        stored_hash.len() == BCRYPT_LENGTH
    }

    fn verify(&self, stored_hash: &str, candidate: &str) -> bool {
        match bcrypt::verify(candidate, stored_hash) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::debug!(error = %e, "malformed bcrypt hash");
                false
            }
        }
    }
}

/// Apache APR1 salted MD5 crypt.
pub struct Apr1;

impl HashScheme for Apr1 {
    fn name(&self) -> &'static str {
        "apr1"
    }

    fn recognizes(&self, stored_hash: &str) -> bool {
        stored_hash.len() == APR1_LENGTH
    }

    fn verify(&self, stored_hash: &str, candidate: &str) -> bool {
        let Some(rest) = stored_hash.strip_prefix(APR1_MAGIC) else {
            return false;
        };
        let salt = rest.split('$').next().unwrap_or_default();
        apr1_hash(candidate, salt) == stored_hash
    }
}

/// Legacy `{SHA}` digest. Compared with plain string equality.
pub struct Sha1Digest;

impl HashScheme for Sha1Digest {
    fn name(&self) -> &'static str {
        "sha1"
    }

    fn recognizes(&self, stored_hash: &str) -> bool {
        stored_hash.len() == SHA1_LENGTH
    }

    fn verify(&self, stored_hash: &str, candidate: &str) -> bool {
        sha1_hash(candidate) == stored_hash
    }
}

/// Tries each scheme in order; the first one that recognizes the hash decides.
pub struct PasswordVerifier {
    schemes: Vec<Box<dyn HashScheme>>,
}

impl Default for PasswordVerifier {
    fn default() -> Self {
        Self::new(vec![Box::new(Bcrypt), Box::new(Apr1), Box::new(Sha1Digest)])
    }
}

impl PasswordVerifier {
    pub fn new(schemes: Vec<Box<dyn HashScheme>>) -> Self {
        Self { schemes }
    }

    /// The scheme that would handle `stored_hash`, if any.
    pub fn scheme_for(&self, stored_hash: &str) -> Option<&dyn HashScheme> {
        self.schemes
            .iter()
            .find(|s| s.recognizes(stored_hash))
            .map(|s| s.as_ref())
    }

    pub fn verify(&self, stored_hash: &str, candidate: &str) -> bool {
        match self.scheme_for(stored_hash) {
            Some(scheme) => {
                tracing::trace!(scheme = scheme.name(), "verifying password");
                scheme.verify(stored_hash, candidate)
            }
            None => {
                tracing::debug!(length = stored_hash.len(), "unsupported hash length");
                false
            }
        }
    }
}

/// `{SHA}` + standard base64 of the SHA-1 digest.
pub fn sha1_hash(password: &str) -> String {
    let digest = Sha1::digest(password.as_bytes());
    format!(
        "{}{}",
        SHA1_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(digest)
    )
}

/// APR1 crypt of `password` with `salt` (truncated to 8 characters).
pub fn apr1_hash(password: &str, salt: &str) -> String {
    let pw = password.as_bytes();
    let salt = &salt.as_bytes()[..salt.len().min(APR1_MAX_SALT)];

    let mut ctx = Md5::new();
    ctx.update(pw);
    ctx.update(APR1_MAGIC.as_bytes());
    ctx.update(salt);

    let mut alt = Md5::new();
    alt.update(pw);
    alt.update(salt);
    alt.update(pw);
    let alt = alt.finalize();

    let mut remaining = pw.len();
    while remaining > 0 {
        let n = remaining.min(16);
        ctx.update(&alt[..n]);
        remaining -= n;
    }

    let mut i = pw.len();
    while i > 0 {
        if i & 1 != 0 {
            ctx.update([0u8]);
        } else {
            ctx.update(&pw[..1]);
        }
        i >>= 1;
    }

    let mut digest = ctx.finalize();

    for round in 0..1000 {
        let mut ctx = Md5::new();
        if round & 1 != 0 {
            ctx.update(pw);
        } else {
            ctx.update(&digest);
        }
        if round % 3 != 0 {
            ctx.update(salt);
        }
        if round % 7 != 0 {
            ctx.update(pw);
        }
        if round & 1 != 0 {
            ctx.update(&digest);
        } else {
            ctx.update(pw);
        }
        digest = ctx.finalize();
    }

    let mut out = String::with_capacity(APR1_LENGTH);
    out.push_str(APR1_MAGIC);
    out.push_str(&String::from_utf8_lossy(salt));
    out.push('$');

    for (a, b, c) in [(0, 6, 12), (1, 7, 13), (2, 8, 14), (3, 9, 15), (4, 10, 5)] {
        let v =
            (u32::from(digest[a]) << 16) | (u32::from(digest[b]) << 8) | u32::from(digest[c]);
        push_crypt64(&mut out, v, 4);
    }
    push_crypt64(&mut out, u32::from(digest[11]), 2);

    out
}

fn push_crypt64(out: &mut String, mut v: u32, n: usize) {
    for _ in 0..n {
        out.push(ITOA64[(v & 0x3f) as usize] as char);
        v >>= 6;
    }
}
