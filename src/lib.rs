#![warn(clippy::indexing_slicing, clippy::unwrap_used, clippy::panic)]

mod bit_reader;
mod error;
mod extent;
mod header;
mod huffman;
mod offset_table;
mod payload;
mod record;
mod reader;

pub use bit_reader::{BitConfig, BitOrder, BitReader};
pub use error::{CmpError, ErrorKind, Res};
pub use header::{ByteOrder, DataHeader, FileHeader, DATA_HEADER_LEN, FILE_HEADER_LEN};
pub use huffman::{CanonicalHuffmanDecoder, SymbolStream, TieBreak};
pub use payload::Assembled;
pub use record::{
    HuffmanTable, LensEncoding, Metadata, SegmentRecord, TableLayout, DEFAULT_SOFT_CAP_BITS, RECORD_LEN,
};
pub use reader::{HeaderOffsets, Reader};
