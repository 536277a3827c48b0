#![no_main]

use b89_bitbuf::b89::Tokenizer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut consumed = 0usize;
    for event in Tokenizer::new(data, 704_968) {
        match event {
            b89_bitbuf::b89::Event::Text(span) => consumed += span.len(),
            b89_bitbuf::b89::Event::Code(_) => consumed += 4,
        }
    }
    assert!(consumed <= data.len());
});
