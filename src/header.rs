use crate::error::{ErrorContext, ErrorKind, Res, ResultBuilder};

/// File header size, fixed by the container format.
pub const FILE_HEADER_LEN: usize = 1024;
/// Data header size, fixed by the container format.
pub const DATA_HEADER_LEN: usize = 4120;

const OFF_DIRTY: usize = 0;
const OFF_IDENT: usize = 4;
const OFF_VERSION: usize = 8;
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
const OFF_FAST: usize = 76;
const OFF_MIDDLE: usize = 80;
const OFF_SLOW: usize = 84;

/// Offset of the first of the two 256-entry `f64` dictionaries within the
/// data header blob. Everything before it is left opaque.
const OFF_QUANT_DICT_A: usize = 24;
const OFF_QUANT_DICT_B: usize = OFF_QUANT_DICT_A + 256 * 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    /// Every fixed-width read goes through `slice`, which turns an
    /// out-of-bounds range into `ShortRead` instead of panicking, matching
    /// the `get`-based idiom the crate's own lint set requires (no
    /// `unwrap`/indexing panics outside tests).
    fn slice<'b, const N: usize>(buf: &'b [u8], at: usize) -> Res<[u8; N]> {
        let s = buf.get(at..at + N).kind(ErrorKind::ShortRead)?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(s);
        Ok(bytes)
    }

    pub(crate) fn read_u32(self, buf: &[u8], at: usize) -> Res<u32> {
        let bytes = Self::slice::<4>(buf, at)?;
        Ok(match self {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        })
    }

    fn read_i32(self, buf: &[u8], at: usize) -> Res<i32> {
        Ok(self.read_u32(buf, at)? as i32)
    }

    pub(crate) fn read_u64(self, buf: &[u8], at: usize) -> Res<u64> {
        let bytes = Self::slice::<8>(buf, at)?;
        Ok(match self {
            ByteOrder::Big => u64::from_be_bytes(bytes),
            ByteOrder::Little => u64::from_le_bytes(bytes),
        })
    }

    pub(crate) fn read_f64(self, buf: &[u8], at: usize) -> Res<f64> {
        let bytes = Self::slice::<8>(buf, at)?;
        Ok(match self {
            ByteOrder::Big => f64::from_be_bytes(bytes),
            ByteOrder::Little => f64::from_le_bytes(bytes),
        })
    }

    pub(crate) fn read_u16(self, buf: &[u8], at: usize) -> Res<u16> {
        let bytes = Self::slice::<2>(buf, at)?;
        Ok(match self {
            ByteOrder::Big => u16::from_be_bytes(bytes),
            ByteOrder::Little => u16::from_le_bytes(bytes),
        })
    }
}

/// The fixed 1024-byte file header: positional offsets, sizes, and the
/// inclusive ranges of the three-dimensional segment grid.
#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub dirty: u32,
    pub ident: u32,
    pub version: u32,
    pub ot_pos: u64,
    pub hdr_pos: u64,
    pub rec_pos_0: u64,
    pub rec_pos_1: u64,
    pub hdr_len: u32,
    pub rec_len: u32,
    pub min_1: i32,
    pub max_1: i32,
    pub min_2: i32,
    pub max_2: i32,
    pub min_3: i32,
    pub max_3: i32,
    /// Dimension-ordering hints. Unused by this reader.
    pub fast: u32,
    pub middle: u32,
    pub slow: u32,
}

impl FileHeader {
    fn parse(buf: &[u8], order: ByteOrder) -> Res<FileHeader> {
        Ok(FileHeader {
            dirty: order.read_u32(buf, OFF_DIRTY)?,
            ident: order.read_u32(buf, OFF_IDENT)?,
            version: order.read_u32(buf, OFF_VERSION)?,
            ot_pos: order.read_u64(buf, OFF_OT_POS)?,
            hdr_pos: order.read_u64(buf, OFF_HDR_POS)?,
            rec_pos_0: order.read_u64(buf, OFF_REC_POS_0)?,
            rec_pos_1: order.read_u64(buf, OFF_REC_POS_1)?,
            hdr_len: order.read_u32(buf, OFF_HDR_LEN)?,
            rec_len: order.read_u32(buf, OFF_REC_LEN)?,
            min_1: order.read_i32(buf, OFF_MIN_1)?,
            max_1: order.read_i32(buf, OFF_MAX_1)?,
            min_2: order.read_i32(buf, OFF_MIN_2)?,
            max_2: order.read_i32(buf, OFF_MAX_2)?,
            min_3: order.read_i32(buf, OFF_MIN_3)?,
            max_3: order.read_i32(buf, OFF_MAX_3)?,
            fast: order.read_u32(buf, OFF_FAST)?,
            middle: order.read_u32(buf, OFF_MIDDLE)?,
            slow: order.read_u32(buf, OFF_SLOW)?,
        })
    }

    pub fn n1(&self) -> i64 {
        self.max_1 as i64 - self.min_1 as i64 + 1
    }

    pub fn n2(&self) -> i64 {
        self.max_2 as i64 - self.min_2 as i64 + 1
    }

    pub fn n3(&self) -> i64 {
        self.max_3 as i64 - self.min_3 as i64 + 1
    }

    /// `n1 * n2 * n3`, widened to `i128` before multiplying and saturated
    /// back to `i64`. Under the "wrong" byte order, `n1`/`n2`/`n3` can each
    /// come out near `2^32` (a byte-swapped small dimension), and their
    /// product routinely exceeds `i64::MAX` by orders of magnitude; `score`
    /// calls this on both candidates unconditionally; so this must saturate
    /// rather than overflow, matching the `wrapping_add` treatment already
    /// given to the offset arithmetic in `score` below.
    pub fn entry_count(&self) -> i64 {
        let product = self.n1() as i128 * self.n2() as i128 * self.n3() as i128;
        product.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// `rec_len`, normalized to 8192 when the header stores it as zero.
    pub fn normalized_rec_len(&self) -> u32 {
        if self.rec_len == 0 {
            8192
        } else {
            self.rec_len
        }
    }
}

/// The opaque 4120-byte data header. Every field but the two quantization
/// dictionaries is left as raw bytes, matching the spec's framing of this
/// block as load-bearing only for its size and position; the two
/// dictionaries themselves are parsed up front so accessors can hand out
/// references instead of copying 2048 bytes per call.
pub struct DataHeader {
    quant_dict_a: [f64; 256],
    quant_dict_b: [f64; 256],
}

impl DataHeader {
    fn parse(buf: &[u8], order: ByteOrder) -> Res<DataHeader> {
        Ok(DataHeader {
            quant_dict_a: read_dict(buf, order, OFF_QUANT_DICT_A)?,
            quant_dict_b: read_dict(buf, order, OFF_QUANT_DICT_B)?,
        })
    }

    pub fn quant_dict_a(&self) -> &[f64; 256] {
        &self.quant_dict_a
    }

    pub fn quant_dict_b(&self) -> &[f64; 256] {
        &self.quant_dict_b
    }
}

fn read_dict(buf: &[u8], order: ByteOrder, base: usize) -> Res<[f64; 256]> {
    let mut out = [0.0f64; 256];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = order.read_f64(buf, base + i * 8)?;
    }
    Ok(out)
}

/// Parses and validates the file/data headers, choosing the byte order by
/// plausibility scoring.
pub struct HeaderParser;

impl ErrorContext for HeaderParser {
    fn describe(&self) -> Option<String> {
        Some("file header".into())
    }
}

impl HeaderParser {
    /// Parses the 1024-byte file header found at the start of `buf`, trying
    /// both byte orders and picking the higher-scoring one (ties favor big
    /// endian). `file_size` is the size known at the time of parsing: the
    /// base extent's size, since the full virtual size isn't known until
    /// `rec_pos_1` is read out of the header itself.
    pub fn parse_file_header(buf: &[u8], file_size: u64) -> Res<(ByteOrder, FileHeader)> {
        HeaderParser.assert_le(FILE_HEADER_LEN, buf.len(), ErrorKind::ShortRead)?;

        let be = FileHeader::parse(buf, ByteOrder::Big)?;
        let le = FileHeader::parse(buf, ByteOrder::Little)?;
        let be_score = score(&be, file_size);
        let le_score = score(&le, file_size);

        log::debug!("header scores: big-endian {be_score}, little-endian {le_score}");

        let (order, header, best) = if le_score > be_score {
            (ByteOrder::Little, le, le_score)
        } else {
            (ByteOrder::Big, be, be_score)
        };

        if best <= 0 {
            return HeaderParser.raise(
                ErrorKind::BadMagic,
                format!("both byte orders scored <= 0 (be {be_score}, le {le_score})"),
            );
        }

        HeaderParser.assert_le(FILE_HEADER_LEN as u64, header.ot_pos, ErrorKind::InconsistentHeader)?;
        HeaderParser.assert_lt(header.ot_pos, header.hdr_pos, ErrorKind::InconsistentHeader)?;
        HeaderParser.assert_le(header.hdr_pos, header.rec_pos_0, ErrorKind::InconsistentHeader)?;
        HeaderParser.assert_lt(header.rec_pos_0, header.rec_pos_1, ErrorKind::InconsistentHeader)?;
        HeaderParser.assert(
            header.n1() > 0 && header.n2() > 0 && header.n3() > 0,
            ErrorKind::InconsistentHeader,
            "dimension counts must be positive",
        )?;

        Ok((order, header))
    }

    pub fn parse_data_header(buf: &[u8], order: ByteOrder) -> Res<DataHeader> {
        HeaderParser.assert_le(DATA_HEADER_LEN, buf.len(), ErrorKind::ShortRead)?;
        DataHeader::parse(&buf[..DATA_HEADER_LEN], order)
    }
}

fn score(h: &FileHeader, file_size: u64) -> i64 {
    let mut s: i64 = 0;

    if h.ot_pos < file_size {
        s += 2;
    }
    if h.ot_pos < h.hdr_pos && h.hdr_pos <= file_size {
        s += 2;
    }
    if h.hdr_pos <= h.rec_pos_0 && h.rec_pos_0 <= file_size {
        s += 2;
    }
    // "within extent budget": sibling extents can make the virtual space
    // arbitrarily larger than the base file, so this only rules out
    // obviously-bogus values rather than comparing against `file_size`.
    if h.rec_pos_1 > h.rec_pos_0 && h.rec_pos_1 < u64::MAX / 2 {
        s += 2;
    }
    if h.normalized_rec_len() == 8192 {
        s += 2;
    }
    if (1024..=65536).contains(&h.hdr_len) {
        s += 1;
    }
    let n = h.entry_count();
    if n > 0 && n < 1_000_000_000 {
        s += 2;
    }
    if n > 0 {
        let n = n as u64;
        let candidate_a = h.ot_pos.wrapping_add(n * 8).wrapping_add(h.hdr_len as u64);
        let candidate_b = candidate_a + 8;
        let near = |candidate: u64| {
            candidate
                .max(h.rec_pos_0)
                .saturating_sub(candidate.min(h.rec_pos_0))
                <= 32
        };
        if near(candidate_a) || near(candidate_b) {
            s += 3;
        }
    }

    s
}
