use std::env;
use std::process::ExitCode;

use cmp_reader::{BitConfig, BitOrder, Reader};

/// `cmpdump <path> [s1 s2 s3]`: opens a CMP file, prints its header layout
/// and segment count, and — given a coordinate — reads that segment,
/// assembles its payload, and prints the first few decoded symbols.
///
/// This is ambient tooling around the reader, not a reimplementation of the
/// downstream tokenize/cluster/report pipeline: it does not emit CSV or
/// JSON, only a human-readable summary, matching the "command-line front-end
/// maps errors to a one-line message and a non-zero exit code" contract.
fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("usage: cmpdump <path> [s1 s2 s3]");
        return ExitCode::FAILURE;
    };

    let mut reader = match Reader::open(path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("cmpdump: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (n1, n2, n3) = reader.dimensions();
    let offsets = reader.header_offsets();
    println!("byte order: {:?}", reader.byte_order());
    println!("dimensions: {n1} x {n2} x {n3}");
    println!(
        "ot_pos={} hdr_pos={} rec_pos_0={} rec_pos_1={} offset_table_base={}",
        offsets.ot_pos, offsets.hdr_pos, offsets.rec_pos_0, offsets.rec_pos_1, offsets.offset_table_base
    );
    println!("extents: {:?}", reader.extent_sizes());
    println!(
        "non-empty segments: {}",
        reader.list_non_empty_segments().len()
    );

    let Some(coord) = parse_coord(&args) else {
        return ExitCode::SUCCESS;
    };

    let (s1, s2, s3) = coord;
    match dump_segment(&mut reader, s1, s2, s3) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cmpdump: {e}");
            ExitCode::FAILURE
        }
    }
}

fn parse_coord(args: &[String]) -> Option<(i32, i32, i32)> {
    let s1 = args.get(2)?.parse().ok()?;
    let s2 = args.get(3)?.parse().ok()?;
    let s3 = args.get(4)?.parse().ok()?;
    Some((s1, s2, s3))
}

fn dump_segment(reader: &mut Reader, s1: i32, s2: i32, s3: i32) -> cmp_reader::Res<()> {
    let (record_start, record) = reader.read_segment(s1, s2, s3)?;
    println!(
        "segment ({s1},{s2},{s3}): huffman base={} N={} payload_start_byte={} required_bits={}",
        record.huffman.base, record.huffman.n, record.payload_start_byte, record.required_bits
    );

    let assembled = reader.assemble_payload_checked(record_start, &record)?;

    let bit_config = record
        .huffman
        .probe_passes
        .first()
        .copied()
        .unwrap_or(BitConfig::new(BitOrder::Msb, false, 0));

    let symbols: Vec<u8> = reader
        .decode_symbols(&record, &assembled, bit_config)
        .take(32)
        .collect::<Result<_, _>>()?;
    println!("first {} decoded symbols: {:?}", symbols.len(), symbols);

    Ok(())
}
