#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut gbx) = gbx_rs::Gbx::read(data.to_vec()) {
        gbx.body.discover_all();
        let _ = gbx.write();
    }
});
