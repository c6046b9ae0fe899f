//! Shared helpers for integration tests.

// Not every test binary uses every helper.
#![allow(dead_code)]

use zipsource::Source;

/// Reads the primary reader to end of data, panicking on any error.
pub fn read_all(source: &mut Source) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        let n = source.read(&mut chunk).expect("read failed");
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&chunk[..n]);
    }
}

/// Reads one stream to end of data, panicking on any error.
pub fn read_all_stream(source: &mut Source, id: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        let n = source.read_stream(id, &mut chunk).expect("stream read failed");
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&chunk[..n]);
    }
}

/// Opens the source, reads everything, closes it.
pub fn open_read_close(mut source: Source) -> Vec<u8> {
    source.open().expect("open failed");
    let out = read_all(&mut source);
    source.close().expect("close failed");
    out
}
