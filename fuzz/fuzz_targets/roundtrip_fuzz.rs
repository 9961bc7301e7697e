#![no_main]
use std::io::{Cursor, Read};

use libfuzzer_sys::fuzz_target;
use pipezip::{CancellationToken, Client, Config};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let formats = pipezip::available_formats();
    let format = formats[data[0] as usize % formats.len()];
    let payload = &data[1..];
    let client = Client::new(Config::with_format(format)).unwrap();
    let token = CancellationToken::new();

    let (compressed, compress_outcome) = client.compress(&token, Cursor::new(payload.to_vec()));
    let (mut plain, decompress_outcome) = client.decompress(&token, compressed);
    let mut out = Vec::new();
    plain.read_to_end(&mut out).unwrap();
    compress_outcome.wait().unwrap();
    decompress_outcome.wait().unwrap();
    assert_eq!(out, payload);
});
