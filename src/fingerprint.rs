use std::{fs::File, io::Read as _, path::Path};

use anyhow::Context as _;

use crate::error::AtlasResult;

/// 128-bit content fingerprint made of two independently seeded FNV-1a lanes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ContentFingerprint {
    pub hi: u64,
    pub lo: u64,
}

impl ContentFingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut a = Fnv1a64::new(0xcbf29ce484222325);
        let mut b = Fnv1a64::new(0x9ae16a3b2f90404f);
        write_u64_pair(&mut a, &mut b, bytes.len() as u64);
        a.write_bytes(bytes);
        b.write_bytes(bytes);
        Self {
            hi: a.finish(),
            lo: b.finish(),
        }
    }

    pub fn of_file(path: &Path) -> AtlasResult<Self> {
        let mut f =
            File::open(path).with_context(|| format!("open '{}' for fingerprint", path.display()))?;
        let mut a = Fnv1a64::new(0xcbf29ce484222325);
        let mut b = Fnv1a64::new(0x9ae16a3b2f90404f);
        let len = f
            .metadata()
            .with_context(|| format!("stat '{}'", path.display()))?
            .len();
        write_u64_pair(&mut a, &mut b, len);

        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = f
                .read(&mut buf)
                .with_context(|| format!("read '{}' for fingerprint", path.display()))?;
            if n == 0 {
                break;
            }
            a.write_bytes(&buf[..n]);
            b.write_bytes(&buf[..n]);
        }
        Ok(Self {
            hi: a.finish(),
            lo: b.finish(),
        })
    }
}

fn write_u64_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, v: u64) {
    a.write_u64(v);
    b.write_u64(v);
}

#[derive(Clone, Copy)]
struct Fnv1a64(u64);

impl Fnv1a64 {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut h = self.0;
        for &b in bytes {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        self.0 = h;
    }

    fn finish(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(
            ContentFingerprint::of_bytes(b"stone"),
            ContentFingerprint::of_bytes(b"stone")
        );
    }

    #[test]
    fn fingerprint_changes_with_content() {
        assert_ne!(
            ContentFingerprint::of_bytes(b"stone"),
            ContentFingerprint::of_bytes(b"stonf")
        );
        assert_ne!(
            ContentFingerprint::of_bytes(b""),
            ContentFingerprint::of_bytes(b"\0")
        );
    }

    #[test]
    fn file_fingerprint_matches_byte_fingerprint() {
        let path = std::env::temp_dir().join(format!(
            "node_atlas_fingerprint_{}_{}.bin",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let bytes: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &bytes).unwrap();
        assert_eq!(
            ContentFingerprint::of_file(&path).unwrap(),
            ContentFingerprint::of_bytes(&bytes)
        );
        std::fs::remove_file(&path).ok();
    }
}
