#![no_main]

use avalanche::PasswordVerifier;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, &str)| {
    let (stored_hash, candidate) = input;

    // A fuzzed bcrypt cost can run for hours
    if stored_hash.len() == avalanche::auth::BCRYPT_LENGTH {
        return;
    }

    // Must never panic, whatever the stored hash looks like
    let _ = PasswordVerifier::default().verify(stored_hash, candidate);
});
