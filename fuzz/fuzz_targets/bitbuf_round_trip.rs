#![no_main]

use b89_bitbuf::bitbuf::BitBufferWriter;
use libfuzzer_sys::fuzz_target;

// Treats the fuzz input as a sequence of (tag, payload) writes, then reads
// everything back and checks every value round-trips or that truncation was
// reported honestly.
fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let mut writer = BitBufferWriter::alloc(1024);
    let mut expected = Vec::new();
    let mut i = 0;

    while i + 5 <= data.len() {
        let tag = data[i] % 3;
        let chunk: [u8; 4] = data[i + 1..i + 5].try_into().unwrap();
        i += 5;

        match tag {
            0 => {
                let v = u32::from_ne_bytes(chunk);
                if writer.write_u32(v).is_ok() {
                    expected.push(v as u64);
                }
            }
            1 => {
                let v = i32::from_ne_bytes(chunk);
                if writer.write_i32(v).is_ok() {
                    expected.push(v as u32 as u64);
                }
            }
            _ => {
                let v = f32::from_ne_bytes(chunk);
                if writer.write_f32(v).is_ok() {
                    expected.push(v.to_bits() as u64);
                }
            }
        }
    }

    writer.clear_truncated();
    let buf = writer.freeze();
    let mut cursor = buf.cursor();

    for want in expected {
        let got = cursor.read_u32().unwrap() as u64;
        assert_eq!(got, want & 0xFFFF_FFFF);
    }
});
