//! Fan-out writers: one stream of bytes, several consumers.

use std::io::{self, Read, Write};

use debarchive_schema::{Digest, HashAlgorithm, Hasher};

/// Forwards writes to an inner writer and feeds exactly the accepted bytes
/// to every configured digest accumulator, in a fixed order.
#[derive(Debug)]
pub struct HashingWriter<W> {
    inner: W,
    hashers: Vec<Hasher>,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    /// Wrap `inner`, hashing with each of `algorithms`.
    pub fn new(inner: W, algorithms: &[HashAlgorithm]) -> Self {
        Self {
            inner,
            hashers: algorithms.iter().map(|a| a.hasher()).collect(),
            written: 0,
        }
    }

    /// Bytes written through so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Borrow the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flush, then return the inner writer with the finished digests (in
    /// the order the algorithms were given) and the byte count.
    ///
    /// # Errors
    ///
    /// Propagates the flush failure.
    pub fn finish(mut self) -> io::Result<(W, Vec<Digest>, u64)> {
        self.inner.flush()?;
        let digests = self.hashers.into_iter().map(Hasher::finalize).collect();
        Ok((self.inner, digests, self.written))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        for hasher in &mut self.hashers {
            hasher.update(&buf[..n]);
        }
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes everything to `primary` and mirrors the accepted bytes to `tap`.
#[derive(Debug)]
pub struct Tee<A, B> {
    primary: A,
    tap: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    /// Pair a destination with a tap.
    pub fn new(primary: A, tap: B) -> Self {
        Self { primary, tap }
    }

    /// Split back into the two writers.
    pub fn into_inner(self) -> (A, B) {
        (self.primary, self.tap)
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.primary.write(buf)?;
        self.tap.write_all(&buf[..n])?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.tap.flush()
    }
}

/// Read `reader` to the end once, returning its length and one digest per
/// algorithm.
///
/// # Errors
///
/// Propagates read failures.
pub fn digest_reader<R: Read>(
    mut reader: R,
    algorithms: &[HashAlgorithm],
) -> io::Result<(u64, Vec<Digest>)> {
    let mut sink = HashingWriter::new(io::sink(), algorithms);
    io::copy(&mut reader, &mut sink)?;
    let (_, digests, size) = sink.finish()?;
    Ok((size, digests))
}
