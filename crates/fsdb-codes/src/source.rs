//! Randomness for candidate codes.

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CodeError, Result};

/// Supplies the random bytes each candidate code is drawn from.
pub trait CodeSource: Send + Sync {
    /// Fill `buf` completely or fail.
    fn fill(&self, buf: &mut [u8]) -> Result<()>;
}

/// The operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsCodeSource;

impl CodeSource for OsCodeSource {
    fn fill(&self, buf: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| CodeError::Random(e.to_string()))
    }
}

/// Replays a fixed byte script, for deterministic tests.
///
/// Fails with `Random` once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    bytes: Mutex<VecDeque<u8>>,
}

impl ScriptedSource {
    pub fn new(bytes: impl IntoIterator<Item = u8>) -> Self {
        Self {
            bytes: Mutex::new(bytes.into_iter().collect()),
        }
    }

    /// Script that yields exactly `codes` with the decimal alphabet.
    ///
    /// Each digit `d` becomes the byte `d`, which maps back to `d`.
    pub fn from_digits<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut bytes = Vec::new();
        for code in codes {
            bytes.extend(
                code.as_ref()
                    .chars()
                    .filter_map(|c| c.to_digit(10))
                    .map(|d| d as u8),
            );
        }
        Self::new(bytes)
    }

    pub fn remaining(&self) -> usize {
        self.bytes.lock().map(|b| b.len()).unwrap_or(0)
    }
}

impl CodeSource for ScriptedSource {
    fn fill(&self, buf: &mut [u8]) -> Result<()> {
        let mut bytes = self
            .bytes
            .lock()
            .map_err(|e| CodeError::Random(format!("lock poisoned: {e}")))?;
        if bytes.len() < buf.len() {
            return Err(CodeError::Random(format!(
                "script exhausted: need {} bytes, {} left",
                buf.len(),
                bytes.len()
            )));
        }
        let n = buf.len();
        for (slot, byte) in buf.iter_mut().zip(bytes.drain(..n)) {
            *slot = byte;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_source_fills_buffer() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        OsCodeSource.fill(&mut a).unwrap();
        OsCodeSource.fill(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn scripted_source_replays_then_fails() {
        let source = ScriptedSource::from_digits(["123", "9"]);
        let mut buf = [0u8; 3];
        source.fill(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(source.remaining(), 1);
        assert!(matches!(source.fill(&mut buf), Err(CodeError::Random(_))));
    }
}
