#![no_main]

use libfuzzer_sys::fuzz_target;

use boosters_serve::artifact::ArtifactStore;

fuzz_target!(|data: &[u8]| {
    let _ = ArtifactStore::default().from_bytes(data);
});
