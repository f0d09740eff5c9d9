//! Programmatic fixture builders for the integration tests. There is no
//! real-world CMP sample file available, so every fixture here is built
//! from scratch: a `FileBuilder` lays out a file header, offset table
//! (with an optional lead-in), data header, and segment records in a
//! chosen byte order, and `build_segment_record_bytes` packs one record's
//! metadata, Huffman table, and bitstream under a chosen bit
//! configuration. Neither is part of the crate's public API: the crate has
//! no write path (per its Non-goals), so these live only under `tests/`.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const FILE_HEADER_LEN: usize = 1024;
pub const DATA_HEADER_LEN: usize = 4120;
pub const RECORD_LEN: usize = 8192;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Order {
    Big,
    Little,
}

impl Order {
    fn put_u32(self, buf: &mut [u8], at: usize, v: u32) {
        let bytes = match self {
            Order::Big => v.to_be_bytes(),
            Order::Little => v.to_le_bytes(),
        };
        buf[at..at + 4].copy_from_slice(&bytes);
    }

    fn put_i32(self, buf: &mut [u8], at: usize, v: i32) {
        self.put_u32(buf, at, v as u32);
    }

    fn put_u64(self, buf: &mut [u8], at: usize, v: u64) {
        let bytes = match self {
            Order::Big => v.to_be_bytes(),
            Order::Little => v.to_le_bytes(),
        };
        buf[at..at + 8].copy_from_slice(&bytes);
    }

    pub fn put_u16(self, buf: &mut [u8], at: usize, v: u16) {
        let bytes = match self {
            Order::Big => v.to_be_bytes(),
            Order::Little => v.to_le_bytes(),
        };
        buf[at..at + 2].copy_from_slice(&bytes);
    }
}

const OFF_OT_POS: usize = 12;
const OFF_HDR_POS: usize = 20;
const OFF_REC_POS_0: usize = 28;
const OFF_REC_POS_1: usize = 36;
const OFF_HDR_LEN: usize = 44;
const OFF_REC_LEN: usize = 48;
const OFF_MIN_1: usize = 52;
const OFF_MAX_1: usize = 56;
const OFF_MIN_2: usize = 60;
const OFF_MAX_2: usize = 64;
const OFF_MIN_3: usize = 68;
const OFF_MAX_3: usize = 72;

/// Builds a complete CMP file byte-for-byte: file header, offset table
/// (dense, optionally preceded by an 8-byte lead-in), data header, and
/// segment records placed contiguously from `rec_pos_0`.
pub struct FileBuilder {
    order: Order,
    lead_in: bool,
    dims: (i32, i32, i32, i32, i32, i32),
    /// One entry per coordinate in linear index order (axis 3 slowest);
    /// `None` means the segment is empty (offset-table entry 0).
    records: Vec<Option<Vec<u8>>>,
}

impl FileBuilder {
    pub fn new(order: Order, dims: (i32, i32, i32, i32, i32, i32)) -> FileBuilder {
        let n = Self::entry_count(dims);
        FileBuilder {
            order,
            lead_in: false,
            dims,
            records: vec![None; n],
        }
    }

    pub fn with_lead_in(mut self) -> FileBuilder {
        self.lead_in = true;
        self
    }

    fn entry_count(dims: (i32, i32, i32, i32, i32, i32)) -> usize {
        let (min1, max1, min2, max2, min3, max3) = dims;
        ((max1 - min1 + 1) * (max2 - min2 + 1) * (max3 - min3 + 1)) as usize
    }

    fn linear_index(&self, s1: i32, s2: i32, s3: i32) -> usize {
        let (min1, max1, min2, max2, _min3, _max3) = self.dims;
        let n1 = (max1 - min1 + 1) as i64;
        let n2 = (max2 - min2 + 1) as i64;
        let i1 = (s1 - min1) as i64;
        let i2 = (s2 - min2) as i64;
        let i3 = (s3 - self.dims.4) as i64;
        (i3 * n1 * n2 + i2 * n1 + i1) as usize
    }

    /// Places a record (its own bytes, already `RECORD_LEN` long) at
    /// `(s1, s2, s3)`.
    pub fn put_segment(mut self, s1: i32, s2: i32, s3: i32, record: Vec<u8>) -> FileBuilder {
        assert_eq!(record.len(), RECORD_LEN);
        let idx = self.linear_index(s1, s2, s3);
        self.records[idx] = Some(record);
        self
    }

    /// Lays out the full file and writes it to a fresh temp path, returning
    /// that path.
    pub fn write(&self) -> PathBuf {
        let n = self.records.len() as u64;
        let lead_in_bytes = if self.lead_in { 8 } else { 0 };

        let ot_pos: u64 = FILE_HEADER_LEN as u64;
        let table_region = lead_in_bytes + n * 8;
        let hdr_pos = ot_pos + table_region;
        let rec_pos_0 = hdr_pos + DATA_HEADER_LEN as u64;

        let occupied: Vec<&Vec<u8>> = self.records.iter().flatten().collect();
        let rec_pos_1 = rec_pos_0 + (occupied.len().max(1) as u64) * RECORD_LEN as u64;

        let mut buf = vec![0u8; FILE_HEADER_LEN];
        self.order.put_u64(&mut buf, OFF_OT_POS, ot_pos);
        self.order.put_u64(&mut buf, OFF_HDR_POS, hdr_pos);
        self.order.put_u64(&mut buf, OFF_REC_POS_0, rec_pos_0);
        self.order.put_u64(&mut buf, OFF_REC_POS_1, rec_pos_1);
        self.order.put_u32(&mut buf, OFF_HDR_LEN, DATA_HEADER_LEN as u32);
        self.order.put_u32(&mut buf, OFF_REC_LEN, RECORD_LEN as u32);
        self.order.put_i32(&mut buf, OFF_MIN_1, self.dims.0);
        self.order.put_i32(&mut buf, OFF_MAX_1, self.dims.1);
        self.order.put_i32(&mut buf, OFF_MIN_2, self.dims.2);
        self.order.put_i32(&mut buf, OFF_MAX_2, self.dims.3);
        self.order.put_i32(&mut buf, OFF_MIN_3, self.dims.4);
        self.order.put_i32(&mut buf, OFF_MAX_3, self.dims.5);

        if self.lead_in {
            buf.extend_from_slice(&[0u8; 8]);
        }

        let mut next_slot: u64 = 0;
        for slot in &self.records {
            match slot {
                Some(_) => {
                    let offset = rec_pos_0 + next_slot * RECORD_LEN as u64;
                    let mut entry = [0u8; 8];
                    match self.order {
                        Order::Big => entry.copy_from_slice(&offset.to_be_bytes()),
                        Order::Little => entry.copy_from_slice(&offset.to_le_bytes()),
                    }
                    buf.extend_from_slice(&entry);
                    next_slot += 1;
                }
                None => buf.extend_from_slice(&[0u8; 8]),
            }
        }

        buf.extend_from_slice(&vec![0u8; DATA_HEADER_LEN]);

        assert_eq!(buf.len() as u64, rec_pos_0);
        for record in &self.records {
            if let Some(bytes) = record {
                buf.extend_from_slice(bytes);
            }
        }

        let dir = tempdir();
        let path = dir.join("fixture.cmp");
        let mut f = File::create(&path).unwrap();
        f.write_all(&buf).unwrap();
        path
    }
}

fn tempdir() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let dir = std::env::temp_dir().join(format!(
        "cmp-reader-e2e-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// A single symbol's canonical code, computed the same way
/// `CanonicalHuffmanDecoder` does: per-length counts, then
/// `code(L) = (code(L-1) + count(L-1)) << 1`, symbols within a length
/// ordered by value.
fn canonical_code_bits(symbols: &[u8], lengths: &[u8], symbol: u8) -> Vec<u8> {
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
        if symbols[i] == symbol {
            found = Some((c, l));
        }
    }
    let (code, length) = found.expect("symbol must be present in the table");
    (0..length).rev().map(|i| ((code >> i) & 1) as u8).collect()
}

/// Writes `bits` into `buf` under the given bit configuration, matching
/// `BitReader::read_bit`'s addressing so the crate's own decoder can read
/// them back.
fn write_bits(buf: &mut [u8], bits: &[u8], msb_first: bool, invert: bool, initial_skip: u8) {
    for (pos, &bit) in bits.iter().enumerate() {
        let p = pos as u64 + initial_skip as u64;
        let byte_index = (p / 8) as usize;
        let bit_in_byte = if msb_first { 7 - (p % 8) } else { p % 8 };
        let stored = if invert { bit ^ 1 } else { bit };
        if stored != 0 {
            buf[byte_index] |= 1 << bit_in_byte;
        }
    }
}

/// Builds one complete, self-contained 8192-byte record: metadata (zeroed,
/// irrelevant to detection), a Huffman table at `base`, and `symbol_stream`
/// encoded MSB-first/non-inverted/no-skip starting at the 16-aligned
/// payload offset.
pub fn build_segment_record_bytes(order: Order, base: usize, symbols: &[u8], lengths: &[u8], symbol_stream: &[u8]) -> Vec<u8> {
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
    let payload_start = (lens_off + n.div_ceil(2) + 15) & !15;

    let mut bits = Vec::new();
    for &sym in symbol_stream {
        bits.extend(canonical_code_bits(symbols, lengths, sym));
    }
    write_bits(&mut buf[payload_start..], &bits, true, false, 0);

    // `order` only matters for the handful of multi-byte metadata fields
    // this helper doesn't otherwise populate; kept as a parameter so
    // callers don't have to reason about byte order for a record that is
    // otherwise order-agnostic (symbol/length bytes are single bytes).
    let _ = order;

    buf
}
