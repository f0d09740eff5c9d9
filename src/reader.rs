use std::path::Path;

use crate::bit_reader::BitConfig;
use crate::error::{ErrorContext, ErrorKind, Res};
use crate::extent::ExtentSet;
use crate::header::{ByteOrder, DataHeader, FileHeader, HeaderParser, FILE_HEADER_LEN};
use crate::huffman::{CanonicalHuffmanDecoder, SymbolStream, TieBreak};
use crate::offset_table::OffsetTable;
use crate::payload::{Assembled, PayloadAssembler};
use crate::record::{SegmentRecord, SegmentRecordParser, DEFAULT_SOFT_CAP_BITS, RECORD_LEN};

/// The handful of positional fields callers typically want without reaching
/// into the reader's private headers.
#[derive(Debug, Clone, Copy)]
pub struct HeaderOffsets {
    pub ot_pos: u64,
    pub hdr_pos: u64,
    pub rec_pos_0: u64,
    pub rec_pos_1: u64,
    pub hdr_len: u32,
    pub rec_len: u32,
    pub offset_table_base: u64,
}

/// The public facade: opens a CMP file, validates its headers, and exposes
/// segment reads and decoding. There is no explicit `Closed` state object —
/// `open` is the only constructor, and the `{Closed, Open}` machine of §4.7
/// is realized by ownership: a `Reader` is always open for its lifetime, and
/// dropping it (closing all extents) is the only way back to `Closed`.
pub struct Reader {
    extents: ExtentSet,
    order: ByteOrder,
    file_header: FileHeader,
    data_header: DataHeader,
    offsets: OffsetTable,
    record_parser: SegmentRecordParser,
}

impl ErrorContext for Reader {
    fn describe(&self) -> Option<String> {
        Some("cmp reader".into())
    }
}

impl Reader {
    /// Opens `path` with the default `soft_cap_bits` (§9, `200_000`).
    pub fn open(path: impl AsRef<Path>) -> Res<Reader> {
        Self::open_with_soft_cap(path, DEFAULT_SOFT_CAP_BITS)
    }

    /// Opens `path`, overriding the §9 `soft_cap_bits` tunable used during
    /// required-bit refinement.
    pub fn open_with_soft_cap(path: impl AsRef<Path>, soft_cap_bits: u64) -> Res<Reader> {
        let path = path.as_ref();

        // The file header must be read before we know `rec_pos_1`, the
        // virtual-size hint ExtentSet needs to decide whether sibling
        // extents must be opened; so open once for just the header, then
        // possibly again with the full target length.
        let mut probe = ExtentSet::open(path, 0)?;
        let head_bytes = probe.slice(0, FILE_HEADER_LEN)?;
        let (order, file_header) = HeaderParser::parse_file_header(&head_bytes, probe.total_len())?;

        let mut extents = if file_header.rec_pos_1 > probe.total_len() {
            ExtentSet::open(path, file_header.rec_pos_1)?
        } else {
            probe
        };

        let data_header_bytes = extents.slice(file_header.hdr_pos, file_header.hdr_len as usize)?;
        let data_header = HeaderParser::parse_data_header(&data_header_bytes, order)?;

        let offsets = OffsetTable::load(&mut extents, &file_header, order)?;

        log::info!(
            "opened cmp reader: {:?}, {}x{}x{} segments across {} extent(s)",
            order,
            offsets.dims().0,
            offsets.dims().1,
            offsets.dims().2,
            extents.extent_sizes().len()
        );

        Ok(Reader {
            extents,
            order,
            file_header,
            data_header,
            offsets,
            record_parser: SegmentRecordParser { soft_cap_bits },
        })
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn dimensions(&self) -> (i64, i64, i64) {
        self.offsets.dims()
    }

    pub fn header_offsets(&self) -> HeaderOffsets {
        HeaderOffsets {
            ot_pos: self.file_header.ot_pos,
            hdr_pos: self.file_header.hdr_pos,
            rec_pos_0: self.file_header.rec_pos_0,
            rec_pos_1: self.file_header.rec_pos_1,
            hdr_len: self.file_header.hdr_len,
            rec_len: self.file_header.normalized_rec_len(),
            offset_table_base: self.offsets.base,
        }
    }

    pub fn data_header(&self) -> &DataHeader {
        &self.data_header
    }

    /// Diagnostic: the size of every physical extent backing the virtual
    /// address space, base file first.
    pub fn extent_sizes(&self) -> Vec<u64> {
        self.extents.extent_sizes()
    }

    /// The effective §9 `soft_cap_bits` value this reader was constructed
    /// with.
    pub fn soft_cap_bits(&self) -> u64 {
        self.record_parser.soft_cap_bits
    }

    pub fn find_first_non_empty(&self) -> Option<(i32, i32, i32)> {
        self.offsets.find_first_non_empty()
    }

    pub fn list_non_empty_segments(&self) -> Vec<(i32, i32, i32)> {
        self.offsets.list_non_empty_segments()
    }

    /// Bounds-checks and linearizes `(s1, s2, s3)`, reads its 8192-byte
    /// record, and parses it (§4.3). Returns the record's absolute start
    /// offset alongside the parsed record, since [`Reader::assemble_payload`]
    /// needs it to find successive records.
    pub fn read_segment(&mut self, s1: i32, s2: i32, s3: i32) -> Res<(u64, SegmentRecord)> {
        let offset = self.offsets.get(s1, s2, s3)?;
        self.assert(offset > 0, ErrorKind::EmptySegment, "offset-table entry is zero")?;
        self.assert_le(
            offset + RECORD_LEN as u64,
            self.extents.total_len(),
            ErrorKind::OutOfRange,
        )?;

        let buf = self.extents.slice(offset, RECORD_LEN)?;
        let record = self.record_parser.parse(&buf, self.order, offset)?;
        Ok((offset, record))
    }

    /// Concatenates `record`'s payload with however many subsequent
    /// records are needed to satisfy `record.required_bits` (§4.4).
    pub fn assemble_payload(&mut self, record_start: u64, record: &SegmentRecord) -> Assembled {
        PayloadAssembler::assemble(&mut self.extents, record_start, record, record.required_bits)
    }

    /// Like [`Reader::assemble_payload`], but treats a short address space as
    /// fatal (`ErrorKind::Truncated`) instead of a flag callers can ignore.
    pub fn assemble_payload_checked(&mut self, record_start: u64, record: &SegmentRecord) -> Res<Assembled> {
        let assembled = self.assemble_payload(record_start, record);
        self.assert(
            !assembled.truncated,
            ErrorKind::Truncated,
            "address space ended before required_bits was satisfied",
        )?;
        Ok(assembled)
    }

    /// Constructs a lazy decoded-symbol sequence over `assembled`'s bytes
    /// under `bit_config`, using the canonical decoder already built for
    /// `record`'s Huffman table.
    pub fn decode_symbols<'r>(
        &self,
        record: &'r SegmentRecord,
        assembled: &'r Assembled,
        bit_config: BitConfig,
    ) -> SymbolStream<'r, 'r> {
        let limit_bits = (assembled.bytes.len() as u64 * 8).min(record.required_bits);
        let bit_reader = crate::bit_reader::BitReader::new(&assembled.bytes, limit_bits, bit_config);
        record.decoder.decode_symbols(bit_reader)
    }

    /// Builds a one-off decoder from `symbols`/`lengths`, independent of any
    /// record's own cached one — a convenience for callers comparing
    /// alternate tables.
    pub fn build_decoder(symbols: &[u8], lengths: &[u8]) -> Res<CanonicalHuffmanDecoder> {
        CanonicalHuffmanDecoder::build(symbols, lengths, TieBreak::SymbolValue, false)
    }
}
