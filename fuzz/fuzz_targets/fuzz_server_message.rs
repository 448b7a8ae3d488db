#![no_main]

use libfuzzer_sys::fuzz_target;
use party_realtime_client::{ChannelEvent, ServerMessage};

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<ServerMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = serde_json::from_str::<ServerMessage>(s) {
            // Every parsed message must map to an event kind.
            let _ = ChannelEvent::from(msg).kind();
        }
    }
});
