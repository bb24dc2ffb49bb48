/// CRC-32 (IEEE) over a byte slice.
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Incremental CRC-32 for data read in blocks.
#[derive(Default)]
pub struct Checksum {
    hasher: crc32fast::Hasher,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
        assert_eq!(checksum(b""), 0);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut c = Checksum::new();
        for block in data.chunks(777) {
            c.update(block);
        }
        assert_eq!(c.finalize(), checksum(&data));
    }
}
