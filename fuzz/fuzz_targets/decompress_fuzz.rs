#![no_main]
use std::io::{Cursor, Read};

use libfuzzer_sys::fuzz_target;
use pipezip::{CancellationToken, Client, Config};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic a worker; errors only.
    let token = CancellationToken::new();
    for format in pipezip::available_formats() {
        let client = Client::new(Config::with_format(*format)).unwrap();
        let (mut output, outcome) = client.decompress(&token, Cursor::new(data.to_vec()));
        let mut out = Vec::new();
        let _ = output.read_to_end(&mut out);
        if let Err(pipezip::StreamError::Aborted) = outcome.wait() {
            panic!("{format} decompressor aborted");
        }
    }
});
