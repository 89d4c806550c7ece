// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It drives exploration choices and must be reproducible for a given nonce.

/// Replacement for an all-zero state, which xorshift can never leave.
const ZERO_STATE_SUBSTITUTE: u64 = 0x9E3779B97F4A7C15;

const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { ZERO_STATE_SUBSTITUTE } else { seed };
        Self { state: seed }
    }

    /// Seeds from the handshake nonce.
    ///
    /// The hash is FNV-1a over the UTF-8 bytes, so the same nonce yields the
    /// same stream in every process and on every platform.
    pub fn from_nonce(nonce: &str) -> Self {
        Self::new(nonce_seed(nonce))
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform draw in `[0, 1)` with 53 bits of precision.
    #[inline]
    pub fn next_f64_01(&mut self) -> f64 {
        let x = self.next_u64() >> 11;
        (x as f64) / ((1u64 << 53) as f64)
    }

    #[inline]
    pub fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        let span = (high - low) as u64;
        let v = self.next_u64() % span;
        low + v as usize
    }
}

pub fn nonce_seed(nonce: &str) -> u64 {
    nonce.as_bytes().iter().fold(FNV_OFFSET_BASIS, |h, &b| {
        (h ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}
