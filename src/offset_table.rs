use crate::error::{ErrorContext, ErrorKind, Res};
use crate::extent::ExtentSet;
use crate::header::{ByteOrder, FileHeader};

/// Dense array of absolute segment-record offsets, indexed
/// `i3*n1*n2 + i2*n1 + i1` (axis 3 slowest). A value of `0` means the
/// segment is empty; any other value is the record's absolute offset.
pub struct OffsetTable {
    entries: Vec<u64>,
    min_1: i32,
    min_2: i32,
    min_3: i32,
    n1: i64,
    n2: i64,
    n3: i64,
    /// The base address this table was read from: `ot_pos` or `ot_pos + 8`.
    pub base: u64,
}

impl ErrorContext for OffsetTable {
    fn describe(&self) -> Option<String> {
        Some(format!(
            "offset table at base {}, {}x{}x{}",
            self.base, self.n1, self.n2, self.n3
        ))
    }
}

impl OffsetTable {
    /// Probes both candidate bases (§4.1), picks the better-scoring one,
    /// applies the flip rule, then reads the full dense array.
    pub fn load(ext: &mut ExtentSet, header: &FileHeader, order: ByteOrder) -> Res<OffsetTable> {
        let n = header.entry_count();
        let probe_ctx = DummyCtx { ot_pos: header.ot_pos };
        probe_ctx.assert(
            n > 0,
            ErrorKind::InconsistentHeader,
            "offset table must have at least one entry",
        )?;
        let n = n as u64;

        let candidate_ot = header.ot_pos;
        let candidate_lead_in = header.ot_pos + 8;

        let score_ot = probe_score(ext, candidate_ot, n, header.rec_pos_1, order);
        let score_lead_in = probe_score(ext, candidate_lead_in, n, header.rec_pos_1, order);

        log::debug!("offset-table base probe: ot_pos={score_ot}, ot_pos+8={score_lead_in}");

        let mut base = if score_lead_in > score_ot {
            candidate_lead_in
        } else {
            candidate_ot
        };

        let flip_threshold = base
            .saturating_add(n * 8)
            .saturating_add(header.hdr_len as u64)
            .saturating_sub(64);
        if header.rec_pos_0 < flip_threshold {
            base = if base == candidate_ot {
                candidate_lead_in
            } else {
                candidate_ot
            };
            log::debug!("offset-table base flipped to {base}");
        }

        let raw = ext.slice(base, n as usize * 8)?;
        let entries = raw
            .chunks_exact(8)
            .map(|c| order.read_u64(c, 0))
            .collect::<Res<Vec<u64>>>()?;

        Ok(OffsetTable {
            entries,
            min_1: header.min_1,
            min_2: header.min_2,
            min_3: header.min_3,
            n1: header.n1(),
            n2: header.n2(),
            n3: header.n3(),
            base,
        })
    }

    fn linear_index(&self, s1: i32, s2: i32, s3: i32) -> Res<usize> {
        self.assert(
            s1 >= self.min_1
                && (s1 as i64) < self.min_1 as i64 + self.n1
                && s2 >= self.min_2
                && (s2 as i64) < self.min_2 as i64 + self.n2
                && s3 >= self.min_3
                && (s3 as i64) < self.min_3 as i64 + self.n3,
            ErrorKind::OutOfRange,
            "segment coordinate outside the grid's inclusive range",
        )?;
        let i1 = (s1 - self.min_1) as i64;
        let i2 = (s2 - self.min_2) as i64;
        let i3 = (s3 - self.min_3) as i64;
        Ok((i3 * self.n1 * self.n2 + i2 * self.n1 + i1) as usize)
    }

    /// Raw offset-table entry for `(s1, s2, s3)`. `0` means empty.
    pub fn get(&self, s1: i32, s2: i32, s3: i32) -> Res<u64> {
        let idx = self.linear_index(s1, s2, s3)?;
        Ok(self.entries[idx])
    }

    pub fn dims(&self) -> (i64, i64, i64) {
        (self.n1, self.n2, self.n3)
    }

    /// Coordinate of the first non-empty entry in linear index order, if
    /// any.
    pub fn find_first_non_empty(&self) -> Option<(i32, i32, i32)> {
        self.iter_coords().find(|&(s1, s2, s3)| {
            let idx = self.linear_index(s1, s2, s3).expect("coord from iter_coords is in range");
            self.entries[idx] != 0
        })
    }

    /// All non-empty coordinates, in linear index order.
    pub fn list_non_empty_segments(&self) -> Vec<(i32, i32, i32)> {
        self.iter_coords()
            .filter(|&(s1, s2, s3)| {
                let idx = self.linear_index(s1, s2, s3).expect("coord from iter_coords is in range");
                self.entries[idx] != 0
            })
            .collect()
    }

    fn iter_coords(&self) -> impl Iterator<Item = (i32, i32, i32)> + '_ {
        let (n1, n2, n3) = (self.n1, self.n2, self.n3);
        (0..n3).flat_map(move |i3| {
            (0..n2).flat_map(move |i2| {
                (0..n1).map(move |i1| {
                    (
                        (i1 + self.min_1 as i64) as i32,
                        (i2 + self.min_2 as i64) as i32,
                        (i3 + self.min_3 as i64) as i32,
                    )
                })
            })
        })
    }
}

/// A throwaway [`ErrorContext`] for the one assertion `load` needs to make
/// before an [`OffsetTable`] exists to be the context.
struct DummyCtx {
    ot_pos: u64,
}

impl ErrorContext for DummyCtx {
    fn describe(&self) -> Option<String> {
        Some(format!("offset table candidate at ot_pos {}", self.ot_pos))
    }
}

fn probe_score(ext: &mut ExtentSet, base: u64, n: u64, rec_pos_1: u64, order: ByteOrder) -> u32 {
    let sample_count = n.min(16);
    let mut indices: Vec<u64> = (0..sample_count).collect();
    if n > 16 {
        indices.extend((n - 16..n).collect::<Vec<_>>());
    }
    indices.sort_unstable();
    indices.dedup();

    let mut score = 0u32;
    for i in indices {
        let addr = base + i * 8;
        let Ok(bytes) = ext.slice(addr, 8) else {
            continue;
        };
        let Ok(value) = order.read_u64(&bytes, 0) else {
            continue;
        };
        if value == 0 || value < rec_pos_1 {
            score += 1;
        }
    }
    score
}
