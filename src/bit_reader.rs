/// Bit order a [`BitReader`] walks a byte buffer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// Most significant bit of each byte first.
    Msb,
    /// Least significant bit of each byte first.
    Lsb,
}

/// The three knobs that disambiguate how a payload's bits map onto bytes:
/// which end of each byte comes first, whether bits are inverted, and how
/// many leading bits to skip. The prefix probe (§4.3) tries all 16
/// combinations of [`BitConfig::probe_matrix`] against a candidate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitConfig {
    pub bit_order: BitOrder,
    pub invert: bool,
    pub initial_skip: u8,
}

impl BitConfig {
    pub const fn new(bit_order: BitOrder, invert: bool, initial_skip: u8) -> Self {
        BitConfig {
            bit_order,
            invert,
            initial_skip,
        }
    }

    /// The 16 `{MSB, LSB} x {normal, inverted} x {shift 0..3}` combinations
    /// the Huffman-table prefix probe tries against a candidate payload.
    pub fn probe_matrix() -> [BitConfig; 16] {
        let mut configs = [BitConfig::new(BitOrder::Msb, false, 0); 16];
        let mut i = 0;
        for &order in &[BitOrder::Msb, BitOrder::Lsb] {
            for &invert in &[false, true] {
                for shift in 0..4u8 {
                    configs[i] = BitConfig::new(order, invert, shift);
                    i += 1;
                }
            }
        }
        configs
    }
}

/// A configurable, single-bit-at-a-time cursor over a byte buffer.
///
/// Bits are consumed one at a time with no internal multi-bit buffering, so
/// random-access-by-position stays meaningful: the prefix probe relies on
/// being able to re-run the same bytes under 16 different configurations
/// without the reader's internal state leaking between attempts.
pub struct BitReader<'a> {
    buf: &'a [u8],
    limit_bits: u64,
    config: BitConfig,
    pos: u64,
}

impl<'a> BitReader<'a> {
    /// `limit_bits` is clamped so the cursor never reads past the buffer
    /// once `initial_skip` is taken into account.
    pub fn new(buf: &'a [u8], limit_bits: u64, config: BitConfig) -> Self {
        let buf_bits = buf.len() as u64 * 8;
        let reachable = buf_bits.saturating_sub(config.initial_skip as u64);
        BitReader {
            buf,
            limit_bits: limit_bits.min(reachable),
            config,
            pos: 0,
        }
    }

    /// Bits consumed so far; monotonically increasing.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn limit_bits(&self) -> u64 {
        self.limit_bits
    }

    pub fn bits_remaining(&self) -> u64 {
        self.limit_bits - self.pos
    }

    /// Returns the next bit (0 or 1), or `None` once `limit_bits` is
    /// reached.
    pub fn read_bit(&mut self) -> Option<u8> {
        if self.pos >= self.limit_bits {
            return None;
        }
        let p = self.pos + self.config.initial_skip as u64;
        let byte_index = (p / 8) as usize;
        let bit_in_byte = match self.config.bit_order {
            BitOrder::Lsb => p % 8,
            BitOrder::Msb => 7 - (p % 8),
        };
        let byte = self.buf[byte_index];
        let mut bit = (byte >> bit_in_byte) & 1;
        if self.config.invert {
            bit ^= 1;
        }
        self.pos += 1;
        Some(bit)
    }
}
