use base64::Engine;
use base64::engine::general_purpose::STANDARD;
const WIDTH_IN_BITS: usize = 160;
const SHIFT: usize = 11;
const BITS_IN_LAST_CELL: usize = 32;
const CELLS: usize = (WIDTH_IN_BITS - 1) / 64 + 1;

/// Size of a QuickXorHash digest in bytes.
pub const DIGEST_LEN: usize = (WIDTH_IN_BITS - 1) / 8 + 1;

/// Streaming QuickXorHash, the content hash the drive service reports for
/// every stored file.
///
/// Each input byte is XORed into a 160-bit circular accumulator at a bit
/// offset that advances by 11 per byte. The total length is folded into the
/// trailing 8 bytes when the digest is taken. State is constant size, so
/// arbitrarily large inputs can be hashed incrementally, and the result does
/// not depend on how the input was split across [`update`](Self::update)
/// calls.
#[derive(Debug, Clone, Default)]
pub struct QuickXorHash {
    /// Two full 64-bit cells followed by one cell with 32 significant bits.
    data: [u64; CELLS],
    length_so_far: u64,
    shift_so_far: usize,
}

impl QuickXorHash {
    /// Creates an empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `bytes` into the accumulator.
    pub fn update(&mut self, bytes: &[u8]) {
        let mut cell = self.shift_so_far / 64;
        let mut offset = self.shift_so_far % 64;

        // Bytes 160 positions apart land on the same bit offset, so each
        // offset is visited once and every byte sharing it is folded in.
        let iterations = bytes.len().min(WIDTH_IN_BITS);

        for i in 0..iterations {
            let is_last_cell = cell == CELLS - 1;
            let bits_in_cell = if is_last_cell { BITS_IN_LAST_CELL } else { 64 };

            if offset <= bits_in_cell - 8 {
                for &b in bytes[i..].iter().step_by(WIDTH_IN_BITS) {
                    self.data[cell] ^= u64::from(b) << offset;
                }
            } else {
                // The byte straddles two cells.
                let next = if is_last_cell { 0 } else { cell + 1 };
                let low = bits_in_cell - offset;

                let mut xored = 0u8;
                for &b in bytes[i..].iter().step_by(WIDTH_IN_BITS) {
                    xored ^= b;
                }

                self.data[cell] ^= u64::from(xored) << offset;
                self.data[next] ^= u64::from(xored) >> low;
            }

            offset += SHIFT;
            while offset >= bits_in_cell {
                cell = if is_last_cell { 0 } else { cell + 1 };
                offset -= bits_in_cell;
            }
        }

        self.shift_so_far =
            (self.shift_so_far + SHIFT * (bytes.len() % WIDTH_IN_BITS)) % WIDTH_IN_BITS;
        self.length_so_far += bytes.len() as u64;
    }

    /// Total number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.length_so_far
    }

    /// Returns `true` if nothing has been hashed yet.
    pub fn is_empty(&self) -> bool {
        self.length_so_far == 0
    }

    /// Returns the 20-byte digest of everything hashed so far.
    ///
    /// Does not consume the hasher; more data may be added afterwards.
    pub fn digest(&self) -> [u8; DIGEST_LEN] {
        let mut out = [0u8; DIGEST_LEN];

        for (i, cell) in self.data[..CELLS - 1].iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&cell.to_le_bytes());
        }
        // Only the low 32 bits of the last cell are part of the digest.
        let last_start = (CELLS - 1) * 8;
        let last = self.data[CELLS - 1].to_le_bytes();
        out[last_start..].copy_from_slice(&last[..DIGEST_LEN - last_start]);

        let length = self.length_so_far.to_le_bytes();
        let fold_start = WIDTH_IN_BITS / 8 - length.len();
        for (dst, src) in out[fold_start..].iter_mut().zip(length) {
            *dst ^= src;
        }

        out
    }

    /// Returns the digest as standard base64, the form the service reports.
    pub fn base64_digest(&self) -> String {
        STANDARD.encode(self.digest())
    }

    /// Returns the digest as lowercase hex.
    pub fn hex_digest(&self) -> String {
        hex::encode(self.digest())
    }

    /// Resets the hasher to its initial state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Computes the base64 QuickXorHash of `data`.
pub fn quickxor_bytes(data: &[u8]) -> String {
    let mut hasher = QuickXorHash::new();
    hasher.update(data);
    hasher.base64_digest()
}
