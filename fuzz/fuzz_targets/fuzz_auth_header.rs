#![no_main]

use avalanche::auth::extract_credentials;
use hyper::header::HeaderValue;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = HeaderValue::from_bytes(data) else {
        return;
    };

    // Any accepted header yields exactly a login and a colon-free password
    if let Ok((login, password)) = extract_credentials(Some(&value)) {
        assert!(!login.contains(':'));
        assert!(!password.contains(':'));
    }
});
