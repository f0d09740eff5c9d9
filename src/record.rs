use crate::bit_reader::{BitConfig, BitReader};
use crate::error::{ErrorContext, ErrorKind, Res};
use crate::header::ByteOrder;
use crate::huffman::{CanonicalHuffmanDecoder, TieBreak};

/// Fixed size of a segment record, in bytes.
pub const RECORD_LEN: usize = 8192;

/// Default value of the §9 `soft_cap_bits` tunable: hand-tuned to one
/// dataset, carried as a constructor parameter rather than a constant.
pub const DEFAULT_SOFT_CAP_BITS: u64 = 200_000;

/// Defensive ceiling on `required_bits`, regardless of `soft_cap_bits`.
const HARD_CAP_BITS: u64 = 8 * RECORD_LEN as u64 * 8;

const OFF_MIN_DELTA: usize = 0;
const OFF_MAX_DELTA: usize = 8;
const OFF_QUANT_DELTAS: usize = 16;
const OFF_BLOCK_SIZE_BITS: usize = 144;

const TABLE_SEARCH_START: usize = 256;
const TABLE_SEARCH_END: usize = 1024;
const MIN_N: usize = 2;
const MAX_N: usize = 64;

/// The two metadata arrays plus the deltas, read off the front of a record.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub min_delta: f64,
    pub max_delta: f64,
    pub quant_deltas: [u16; 64],
    pub block_size_bits: [u16; 64],
}

impl Metadata {
    /// `Σ block_size_bits`, per §3. Informational: the bit count that
    /// actually governs multi-record assembly is the refined value found by
    /// [`SegmentRecordParser`]'s third phase, not this sum.
    pub fn required_bits(&self) -> u64 {
        self.block_size_bits.iter().map(|&b| b as u64).sum()
    }

    fn parse(buf: &[u8], order: ByteOrder) -> Res<Metadata> {
        let mut quant_deltas = [0u16; 64];
        let mut block_size_bits = [0u16; 64];
        for i in 0..64 {
            quant_deltas[i] = order.read_u16(buf, OFF_QUANT_DELTAS + i * 2)?;
            block_size_bits[i] = order.read_u16(buf, OFF_BLOCK_SIZE_BITS + i * 2)?;
        }
        Ok(Metadata {
            min_delta: order.read_f64(buf, OFF_MIN_DELTA)?,
            max_delta: order.read_f64(buf, OFF_MAX_DELTA)?,
            quant_deltas,
            block_size_bits,
        })
    }
}

/// The table layout a record's Huffman table was detected in. Only
/// `SymLen` is implemented (§9 open question): the source carries vestigial
/// support for a `LenSym` layout and byte-wise lengths, but no producer of
/// either exists to validate against, so detection never emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLayout {
    SymLen,
}

/// How code lengths are packed next to the symbol array. Only
/// `NibbleHiLo` (high nibble first) is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LensEncoding {
    NibbleHiLo,
}

/// A detected canonical Huffman table plus the byte range it and the
/// payload occupy within the record.
#[derive(Debug, Clone)]
pub struct HuffmanTable {
    pub base: usize,
    pub n: usize,
    pub symbols: Vec<u8>,
    pub lengths: Vec<u8>,
    pub payload_start_byte: usize,
    pub layout: TableLayout,
    pub lens_encoding: LensEncoding,
    /// Bit configurations that passed the prefix probe, in
    /// [`BitConfig::probe_matrix`] order. Usually a single entry; more than
    /// one means the table admits multiple valid readings that only the
    /// downstream pipeline can disambiguate (§8 scenario 5).
    pub probe_passes: Vec<BitConfig>,
}

/// A parsed 8192-byte segment record: metadata, detected Huffman table, and
/// the decoder built from it. Owns its decoded fields; the raw payload
/// bytes still live here too since multi-record assembly needs to reread
/// this record's tail.
pub struct SegmentRecord {
    pub metadata: Metadata,
    pub huffman: HuffmanTable,
    pub payload_start_byte: usize,
    pub required_bits: u64,
    pub decoder: CanonicalHuffmanDecoder,
    buf: Vec<u8>,
}

impl SegmentRecord {
    /// This record's own contribution to a segment's bitstream: the byte
    /// range `[payload_start_byte, RECORD_LEN)`.
    pub fn payload_slice(&self) -> &[u8] {
        &self.buf[self.payload_start_byte..]
    }
}

/// Parses an 8192-byte record buffer: metadata, then a Huffman-table search
/// over undeclared candidate positions, then a required-bit refinement scan.
pub struct SegmentRecordParser {
    pub soft_cap_bits: u64,
}

impl Default for SegmentRecordParser {
    fn default() -> Self {
        SegmentRecordParser {
            soft_cap_bits: DEFAULT_SOFT_CAP_BITS,
        }
    }
}

struct RecordCtx {
    record_offset: u64,
}

impl ErrorContext for RecordCtx {
    fn describe(&self) -> Option<String> {
        Some(format!("segment record at offset {}", self.record_offset))
    }
}

impl SegmentRecordParser {
    pub fn parse(&self, buf: &[u8], order: ByteOrder, record_offset: u64) -> Res<SegmentRecord> {
        let ctx = RecordCtx { record_offset };
        ctx.assert_eq(buf.len(), RECORD_LEN, ErrorKind::ShortRead)?;

        let metadata = Metadata::parse(buf, order)?;
        let huffman = self.find_huffman_table(buf, &ctx)?;
        let decoder =
            CanonicalHuffmanDecoder::build(&huffman.symbols, &huffman.lengths, TieBreak::SymbolValue, false)?;
        let payload_start_byte = huffman.payload_start_byte;
        let required_bits = self.refine_required_bits(buf, order, payload_start_byte);

        Ok(SegmentRecord {
            metadata,
            huffman,
            payload_start_byte,
            required_bits,
            decoder,
            buf: buf.to_vec(),
        })
    }

    fn find_huffman_table(&self, buf: &[u8], ctx: &RecordCtx) -> Res<HuffmanTable> {
        let mut best: Option<(i64, HuffmanTable)> = None;
        let mut best_partial_score = i64::MIN;

        for base in TABLE_SEARCH_START..TABLE_SEARCH_END {
            for n in MIN_N..=MAX_N {
                let lens_off = base + n;
                let lens_bytes = n.div_ceil(2);
                if lens_off + lens_bytes > buf.len() {
                    continue;
                }

                let symbols = buf[base..base + n].to_vec();
                let mut lengths = Vec::with_capacity(n);
                for i in 0..n {
                    let byte = buf[lens_off + i / 2];
                    let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                    lengths.push(nibble);
                }

                best_partial_score = best_partial_score.max(partial_score(&symbols, &lengths));

                if lengths.iter().any(|&l| l > 15) {
                    continue;
                }
                if !pairwise_distinct(&symbols) {
                    continue;
                }
                let non_zero_count = lengths.iter().filter(|&&l| l > 0).count();
                if non_zero_count < 2 {
                    continue;
                }

                let decoder =
                    match CanonicalHuffmanDecoder::build(&symbols, &lengths, TieBreak::SymbolValue, false) {
                        Ok(d) => d,
                        Err(_) => continue,
                    };
                let max_len = decoder.max_len();

                let payload_start_byte = align16(base + n + lens_bytes);
                if !(512..RECORD_LEN).contains(&payload_start_byte) {
                    continue;
                }

                let probe_passes = probe_bit_configs(&decoder, &buf[payload_start_byte..]);
                if probe_passes.is_empty() {
                    continue;
                }

                let mut score: i64 = 0;
                if n >= 3 {
                    score += 3;
                }
                if payload_start_byte % 16 == 0 {
                    score += 1;
                }
                score += max_len.min(8) as i64;
                score += non_zero_count as i64;
                if (32..=48).contains(&n) {
                    score += 4;
                }

                let candidate = HuffmanTable {
                    base,
                    n,
                    symbols,
                    lengths,
                    payload_start_byte,
                    layout: TableLayout::SymLen,
                    lens_encoding: LensEncoding::NibbleHiLo,
                    probe_passes,
                };

                let replace = match &best {
                    None => true,
                    Some((best_score, best_table)) => {
                        score > *best_score
                            || (score == *best_score && payload_start_byte < best_table.payload_start_byte)
                    }
                };
                if replace {
                    best = Some((score, candidate));
                }
            }
        }

        match best {
            Some((score, table)) => {
                log::debug!(
                    "huffman table at base {} (N={}) won with score {score}",
                    table.base,
                    table.n
                );
                Ok(table)
            }
            None => ctx.raise(
                ErrorKind::TableNotFound,
                format!("no huffman-table candidate passed detection (best partial score {best_partial_score})"),
            ),
        }
    }

    /// Scans `[payload_start_byte-512, payload_start_byte)` for the first
    /// 4-byte window whose value is a plausible bit count, falling back to
    /// `available_bits + 44000` capped by `min(hard_cap_bits, soft_cap_bits)`.
    fn refine_required_bits(&self, buf: &[u8], order: ByteOrder, payload_start_byte: usize) -> u64 {
        let available_bits_in_this_record = (RECORD_LEN - payload_start_byte) as u64 * 8;
        let cap = HARD_CAP_BITS.min(self.soft_cap_bits);
        let scan_start = payload_start_byte.saturating_sub(512);

        for start in scan_start..payload_start_byte {
            if start + 4 > buf.len() {
                break;
            }
            let Ok(v) = order.read_u32(buf, start) else {
                break;
            };
            let v = v as u64;
            if v > available_bits_in_this_record && v <= cap {
                return v;
            }
        }

        (available_bits_in_this_record + 44000).min(cap)
    }
}

fn align16(x: usize) -> usize {
    (x + 15) & !15
}

fn pairwise_distinct(symbols: &[u8]) -> bool {
    let mut seen = [false; 256];
    for &s in symbols {
        if seen[s as usize] {
            return false;
        }
        seen[s as usize] = true;
    }
    true
}

/// A cheap lower-bound score used only for the `TableNotFound` diagnostic;
/// unlike the scoring rule for accepted candidates, this runs on candidates
/// that were rejected, so it can't assume they satisfy Kraft or the probe.
fn partial_score(symbols: &[u8], lengths: &[u8]) -> i64 {
    let mut score = 0;
    if lengths.iter().all(|&l| l <= 15) {
        score += 1;
    }
    if pairwise_distinct(symbols) {
        score += 1;
    }
    score + lengths.iter().filter(|&&l| l > 0).count() as i64
}

/// Runs the prefix probe (§4.3) for a candidate decoder against up to the
/// first 256 bytes of the tentative payload, returning every bit
/// configuration that decoded at least 32 of 64 attempted symbols with at
/// least 4 distinct symbols seen.
fn probe_bit_configs(decoder: &CanonicalHuffmanDecoder, payload: &[u8]) -> Vec<BitConfig> {
    let probe_len = payload.len().min(256);
    let probe_buf = &payload[..probe_len];
    let limit_bits = probe_len as u64 * 8;

    BitConfig::probe_matrix()
        .into_iter()
        .filter(|&config| {
            let mut reader = BitReader::new(probe_buf, limit_bits, config);
            let mut decoded = 0u32;
            let mut seen = [false; 256];
            let mut distinct = 0u32;
            for _ in 0..64 {
                match decoder.decode(&mut reader) {
                    Ok(symbol) => {
                        decoded += 1;
                        if !seen[symbol as usize] {
                            seen[symbol as usize] = true;
                            distinct += 1;
                        }
                    }
                    Err(_) => break,
                }
            }
            decoded >= 32 && distinct >= 4
        })
        .collect()
}

#[cfg(test)]
impl SegmentRecord {
    /// Builds a record with a minimal stand-in Huffman table, for tests
    /// (payload assembly) that only care about `payload_start_byte` and the
    /// raw bytes, not real table detection.
    pub(crate) fn for_test(payload_start_byte: usize, required_bits: u64, buf: Vec<u8>) -> SegmentRecord {
        let symbols = vec![0u8, 1u8];
        let lengths = vec![1u8, 1u8];
        let decoder =
            CanonicalHuffmanDecoder::build(&symbols, &lengths, TieBreak::SymbolValue, false).unwrap();
        SegmentRecord {
            metadata: Metadata::parse(&buf, ByteOrder::Big).unwrap(),
            huffman: HuffmanTable {
                base: 0,
                n: 2,
                symbols,
                lengths,
                payload_start_byte,
                layout: TableLayout::SymLen,
                lens_encoding: LensEncoding::NibbleHiLo,
                probe_passes: Vec::new(),
            },
            payload_start_byte,
            required_bits,
            decoder,
            buf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_reader::BitOrder;

    /// Builds a record buffer with a table at `base` and a payload encoded
    /// under `config`, long enough for the prefix probe and a few decodes
    /// past it.
    fn build_record(
        base: usize,
        symbols: &[u8],
        lengths: &[u8],
        config: BitConfig,
        symbol_stream: &[u8],
    ) -> Vec<u8> {
        let mut buf = vec![0u8; RECORD_LEN];
        let n = symbols.len();
        buf[base..base + n].copy_from_slice(symbols);
        let lens_off = base + n;
        for i in 0..n {
            let nibble = lengths[i];
            if i % 2 == 0 {
                buf[lens_off + i / 2] |= nibble << 4;
            } else {
                buf[lens_off + i / 2] |= nibble;
            }
        }
        let payload_start = align16(lens_off + n.div_ceil(2));

        let decoder =
            CanonicalHuffmanDecoder::build(symbols, lengths, TieBreak::SymbolValue, false).unwrap();
        let mut code_bits = Vec::new();
        for &sym in symbol_stream {
            let idx = symbols.iter().position(|&s| s == sym).unwrap();
            let length = lengths[idx];
            // Recompute the canonical code the same way the decoder did, by
            // walking from length 1 up, to avoid depending on decoder internals.
            code_bits.extend(canonical_code_bits(symbols, lengths, sym, length));
        }
        let _ = decoder; // built only to validate the table is well-formed

        write_bits(&mut buf[payload_start..], &code_bits, config);

        // metadata: keep block_size_bits all zero, irrelevant to detection.
        let _ = &mut buf[OFF_BLOCK_SIZE_BITS..OFF_BLOCK_SIZE_BITS + 128];
        buf
    }

    fn canonical_code_bits(symbols: &[u8], lengths: &[u8], symbol: u8, length: u8) -> Vec<u8> {
        let mut count = [0u32; 16];
        for &l in lengths {
            count[l as usize] += 1;
        }
        let max_len = (1..=15u8).rev().find(|&l| count[l as usize] > 0).unwrap();
        let mut next_code = [0u32; 17];
        let mut code = 0u32;
        for l in 1..=max_len {
            code = (code + count[l as usize - 1]) << 1;
            next_code[l as usize] = code;
        }
        let mut order: Vec<usize> = (0..symbols.len()).filter(|&i| lengths[i] > 0).collect();
        order.sort_by(|&a, &b| lengths[a].cmp(&lengths[b]).then(symbols[a].cmp(&symbols[b])));
        let mut found = None;
        for i in order {
            let l = lengths[i];
            let c = next_code[l as usize];
            next_code[l as usize] += 1;
            if symbols[i] == symbol && l == length {
                found = Some((c, l));
            }
        }
        let (code, length) = found.unwrap();
        (0..length).rev().map(|i| ((code >> i) & 1) as u8).collect()
    }

    fn write_bits(buf: &mut [u8], bits: &[u8], config: BitConfig) {
        let mut reader_pos = 0u64;
        for &bit in bits {
            let p = reader_pos + config.initial_skip as u64;
            let byte_index = (p / 8) as usize;
            let bit_in_byte = match config.bit_order {
                BitOrder::Lsb => p % 8,
                BitOrder::Msb => 7 - (p % 8),
            };
            let stored = if config.invert { bit ^ 1 } else { bit };
            if stored != 0 {
                buf[byte_index] |= 1 << bit_in_byte;
            }
            reader_pos += 1;
        }
    }

    #[test_log::test]
    fn detects_synthetic_table_matching_scenario_3() {
        // 39 symbols at base 300, N and base matching §8 scenario 3 exactly;
        // the length distribution is adjusted from the scenario's own
        // {4:12,5:12,6:9,7:6} (which oversubscribes Kraft: 168 > 2^7) to
        // {4:2,5:22,6:9,7:6}, a complete code with the same N and max_len.
        let mut symbols = Vec::new();
        let mut lengths = Vec::new();
        let mut next_symbol = 0u8;
        for (len, count) in [(4u8, 2), (5, 22), (6, 9), (7, 6)] {
            for _ in 0..count {
                symbols.push(next_symbol);
                lengths.push(len);
                next_symbol += 1;
            }
        }
        assert_eq!(symbols.len(), 39);

        let config = BitConfig::new(BitOrder::Msb, false, 0);
        // A repeating stream of a handful of distinct symbols so the prefix
        // probe sees >= 4 distinct symbols within 64 decodes.
        let stream: Vec<u8> = (0..80).map(|i| symbols[i % 6]).collect();
        let buf = build_record(300, &symbols, &lengths, config, &stream);

        let parser = SegmentRecordParser::default();
        let record = parser.parse(&buf, ByteOrder::Big, 0).unwrap();
        assert_eq!(record.huffman.base, 300);
        assert_eq!(record.huffman.payload_start_byte, align16(300 + 39 + 20));
        assert_eq!(record.huffman.payload_start_byte, 368);
    }

    /// Scenario 5: of the 16 `BitConfig::probe_matrix()` combinations,
    /// exactly the one a payload was actually encoded under should survive
    /// the prefix probe.
    ///
    /// Uses a deliberately sparse, uniform-length-8 table (4 symbols, all
    /// length 8, so only 4 of 256 possible byte values are valid codewords
    /// and every valid codeword shares a 6-bit zero prefix). Each codeword
    /// is then exactly one byte, so the real stream is just the byte
    /// sequence `[0, 1, 2, 3]` repeated, followed by `0xFF` filler (whose
    /// leading 1-bit can never match the all-zero-prefixed table). Any
    /// misaligned/reordered/inverted reading of that narrow, cycling byte
    /// pattern breaks the required zero-prefix within the first few
    /// decodes, well short of the 32-of-64 threshold the probe requires.
    #[test_log::test]
    fn prefix_probe_accepts_only_the_true_configuration() {
        let symbols = vec![10u8, 20, 30, 40];
        let lengths = vec![8u8, 8, 8, 8];
        let decoder =
            CanonicalHuffmanDecoder::build(&symbols, &lengths, TieBreak::SymbolValue, false).unwrap();

        let mut payload = vec![0u8; 256];
        for (i, b) in payload.iter_mut().take(40).enumerate() {
            *b = (i % 4) as u8;
        }
        for b in payload.iter_mut().skip(40) {
            *b = 0xFF;
        }

        let passes = probe_bit_configs(&decoder, &payload);
        assert_eq!(passes, vec![BitConfig::new(BitOrder::Msb, false, 0)]);
    }

    #[test_log::test]
    fn no_candidate_passing_is_table_not_found() {
        let buf = vec![0u8; RECORD_LEN];
        let parser = SegmentRecordParser::default();
        let err = parser.parse(&buf, ByteOrder::Big, 4096).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TableNotFound);
    }

    #[test_log::test]
    fn metadata_required_bits_sums_block_size_bits() {
        let mut buf = vec![0u8; RECORD_LEN];
        for i in 0..64u16 {
            let off = OFF_BLOCK_SIZE_BITS + i as usize * 2;
            buf[off..off + 2].copy_from_slice(&(i + 1).to_be_bytes());
        }
        let metadata = Metadata::parse(&buf, ByteOrder::Big).unwrap();
        let expected: u64 = (1..=64u64).sum();
        assert_eq!(metadata.required_bits(), expected);
    }
}
