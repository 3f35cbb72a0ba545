#![no_main]

use avalanche::Config;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let input = match std::str::from_utf8(data) {
        Ok(s) => s,
        Err(_) => return,
    };

    // Exercise YAML config parsing; errors are fine
    if let Ok(config) = Config::parse(input) {
        let _ = config.server.socket_addr();
    }
});
