#![no_main]

use libfuzzer_sys::fuzz_target;
use tincweb_types::{EventName, EventPayload};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as an event payload must decode or fail, never panic
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(s)
    {
        for name in EventName::ALL {
            let _ = EventPayload::decode(name, value.clone());
        }
    }
});
