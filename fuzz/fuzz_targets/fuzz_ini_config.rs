//! Fuzz target: INI configuration parser
//!
//! Feeds arbitrary text to `MeterConfig::from_ini` and verifies:
//! - No panics on any input
//! - Validation and the redacted JSON dump never panic either
//! - A configured API key is always masked in the redacted dump
//!
//! cargo fuzz run fuzz_ini_config

#![no_main]

use emon::config::MeterConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let cfg = MeterConfig::from_ini(text);
    let _ = cfg.validate();
    let dump = cfg.to_redacted_json();
    if !cfg.api_key.is_empty() {
        assert!(dump.contains("\"api_key\":\"***\""), "API key not masked");
    }
});
