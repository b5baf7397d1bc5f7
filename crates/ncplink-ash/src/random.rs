//! Data field randomization.
//!
//! Every DATA frame payload is XORed with a pseudo-random sequence so long
//! runs of reserved bytes don't blow up the byte-stuffed frame size. The
//! sequence restarts at the seed for every frame; applying it twice is the
//! identity.

const SEED: u8 = 0x42;
const FEEDBACK: u8 = 0xB8;

/// Pseudo-random byte sequence used to scramble one frame.
#[derive(Debug, Clone)]
pub struct Scrambler {
    state: u8,
}

impl Scrambler {
    /// A sequence starting at the seed.
    pub fn new() -> Self {
        Self { state: SEED }
    }
}

impl Default for Scrambler {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for Scrambler {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let current = self.state;
        self.state = (current >> 1) & 0x7F;
        if current & 1 != 0 {
            self.state ^= FEEDBACK;
        }
        Some(current)
    }
}

/// XOR `data` in place with a fresh sequence. Scrambles and descrambles.
pub fn scramble(data: &mut [u8]) {
    for (byte, mask) in data.iter_mut().zip(Scrambler::new()) {
        *byte ^= mask;
    }
}
