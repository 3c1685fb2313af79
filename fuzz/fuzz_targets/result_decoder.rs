#![no_main]

use libfuzzer_sys::fuzz_target;
use phasemeter::attribution::persist::decode_envelope;
use phasemeter::attribution::StepResult;
use phasemeter::scenario::{BuiltScenario, Scenario};
use std::sync::OnceLock;

const SCENARIO: &str = r#"
[[phases]]
path = "/a"
first = 0
last = 3

[[phases]]
path = "/b"
first = 2
last = 5

[[metrics]]
path = "/cpu"
kind = "consumable"
capacity = 4.0
samples = [1.0, 2.0, 3.0, 4.0, 3.0, 2.0]

[[metrics]]
path = "/gc"
kind = "blocking"
blocked = [1, 4]

[[rules]]
phase = "/a"
metric = "/cpu"
exact = 1.0

[[rules]]
phase = "/b"
metric = "/cpu"
variable = 2.0

[[rules]]
phase = "/b"
metric = "/gc"
applies = true
"#;

fn scenario() -> &'static BuiltScenario {
    static BUILT: OnceLock<BuiltScenario> = OnceLock::new();
    BUILT.get_or_init(|| {
        Scenario::from_toml_str(SCENARIO)
            .and_then(|s| s.build())
            .expect("fuzz scenario builds")
    })
}

fuzz_target!(|data: &[u8]| {
    // Neither the envelope nor the payload decoder may panic on any input
    let built = scenario();
    let _ = decode_envelope(data);
    if let Ok(result) = StepResult::from_bytes(data, &built.context(), &built.providers) {
        // Anything accepted must survive a re-encode
        let bytes = result.to_bytes().unwrap();
        let again = StepResult::from_bytes(&bytes, &built.context(), &built.providers)
            .expect("re-encoded result decodes");
        assert_eq!(again.to_bytes().unwrap(), bytes);
    }
});
