#![no_main]

use ark_intent::IntentMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = IntentMessage::from_payload(data) {
        let _ = message.validate(0);
        let _ = message.validate(usize::MAX);
        let payload = message.to_payload().expect("decoded message must encode");
        assert_eq!(IntentMessage::from_payload(&payload).ok(), Some(message));
    }
});
