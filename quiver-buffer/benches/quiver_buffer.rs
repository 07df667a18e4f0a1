#![allow(clippy::unwrap_used)]

use divan::Bencher;
use quiver_buffer::ByteBuffer;

fn main() {
    divan::main();
}

#[divan::bench(args = [1, 100, 1_000, 100_000])]
fn push_u64(bencher: Bencher, n: u64) {
    bencher.bench(|| {
        let mut buffer = ByteBuffer::empty();
        for i in 0..n {
            buffer.push(i).unwrap();
        }
        buffer
    });
}

#[divan::bench(args = [1, 100, 1_000, 100_000])]
fn extend_from_slice(bencher: Bencher, n: usize) {
    let chunk = [7u8; 16];
    bencher.bench(|| {
        let mut buffer = ByteBuffer::empty();
        for _ in 0..n {
            buffer.extend_from_slice(&chunk).unwrap();
        }
        buffer
    });
}
