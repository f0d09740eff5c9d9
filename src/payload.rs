use crate::extent::ExtentSet;
use crate::record::{SegmentRecord, RECORD_LEN};

/// The result of concatenating a segment's payload across however many
/// physical records it spans.
pub struct Assembled {
    pub bytes: Vec<u8>,
    /// Set when the address space ended before `bytes` reached the
    /// requested length. Callers decide whether a short bitstream is fatal.
    pub truncated: bool,
}

/// Concatenates payload bytes across successive physical records to
/// satisfy a required bit count (§4.4).
pub struct PayloadAssembler;

impl PayloadAssembler {
    /// `record_start` is the absolute offset this record's own 8192 bytes
    /// began at; subsequent records are assumed to continue at
    /// `record_start + k*8192` without needing to be parsed themselves.
    pub fn assemble(
        ext: &mut ExtentSet,
        record_start: u64,
        record: &SegmentRecord,
        required_bits: u64,
    ) -> Assembled {
        let required_bytes = required_bits.div_ceil(8) as usize;
        let mut out = Vec::with_capacity(required_bytes);
        out.extend_from_slice(record.payload_slice());

        let mut k = 1u64;
        let mut truncated = false;
        while out.len() < required_bytes {
            let addr = record_start + k * RECORD_LEN as u64;
            let total_len = ext.total_len();
            if addr >= total_len {
                truncated = true;
                break;
            }
            let want = (RECORD_LEN as u64).min(total_len - addr) as usize;
            match ext.slice(addr, want) {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(_) => {
                    truncated = true;
                    break;
                }
            }
            if want < RECORD_LEN {
                // Partial final extent: nothing more to append.
                break;
            }
            k += 1;
        }

        if out.len() < required_bytes {
            truncated = true;
        }
        out.truncate(required_bytes);

        log::debug!(
            "assembled {} of {} required bytes across {} record(s){}",
            out.len(),
            required_bytes,
            k,
            if truncated { " (truncated)" } else { "" }
        );

        Assembled { bytes: out, truncated }
    }
}
