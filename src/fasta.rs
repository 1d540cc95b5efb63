//! FASTA reading for gene annotation files.
//!
//! Annotation headers carry an identifier produced by an external annotation
//! tool; everything after the first whitespace is discarded. Sequences are
//! uppercased on read. Zero-length records are preserved so callers can count
//! them.

use crate::error::{PanforgeError, Result};
use flate2::read::GzDecoder;
use memmap2::Mmap;
use nom::{
    bytes::complete::{tag, take_till},
    character::complete::{line_ending, not_line_ending},
    combinator::map,
    IResult,
};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub id: String,
    pub sequence: Vec<u8>,
}

impl FastaRecord {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// Parse a FASTA header line, keeping only the identifier
fn parse_header(input: &[u8]) -> IResult<&[u8], &str> {
    let (input, _) = tag(b">")(input)?;
    let (input, id) = map(
        take_till(|c: u8| c == b' ' || c == b'\t' || c == b'\n' || c == b'\r'),
        |s| std::str::from_utf8(s).unwrap_or(""),
    )(input)?;
    let (input, _) = not_line_ending(input)?;
    let (input, _) = line_ending(input)?;
    Ok((input, id))
}

/// Parse sequence lines until next header or EOF
fn parse_sequence(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let mut sequence = Vec::new();
    let mut remaining = input;

    while !remaining.is_empty() && remaining[0] != b'>' {
        let (rest, line) =
            take_till::<_, _, nom::error::Error<_>>(|c: u8| c == b'\n' || c == b'\r')(remaining)?;
        let (rest, _) = nom::combinator::opt(line_ending)(rest)?;

        for &c in line {
            if !c.is_ascii_whitespace() {
                sequence.push(c.to_ascii_uppercase());
            }
        }

        remaining = rest;
    }

    Ok((remaining, sequence))
}

fn parse_record(input: &[u8]) -> IResult<&[u8], FastaRecord> {
    let (input, id) = parse_header(input)?;
    let (input, sequence) = parse_sequence(input)?;
    Ok((
        input,
        FastaRecord {
            id: id.to_string(),
            sequence,
        },
    ))
}

/// Parse all records from a byte buffer
pub fn parse_fasta_from_bytes(buffer: &[u8]) -> Result<Vec<FastaRecord>> {
    let mut input = buffer;
    let mut records = Vec::new();

    while !input.is_empty() {
        while !input.is_empty() && input[0].is_ascii_whitespace() {
            input = &input[1..];
        }

        if input.is_empty() || input[0] != b'>' {
            break;
        }

        match parse_record(input) {
            Ok((remaining, record)) => {
                records.push(record);
                input = remaining;
            }
            Err(err) => {
                return Err(PanforgeError::Parse(format!(
                    "failed to parse FASTA: {err:?}"
                )));
            }
        }
    }

    Ok(records)
}

/// Parse a FASTA file into records (supports .gz compression)
pub fn read_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<FastaRecord>> {
    let path = path.as_ref();
    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        let file = File::open(path)?;
        let mut decoder = GzDecoder::new(BufReader::new(file));
        let mut buffer = Vec::new();
        decoder.read_to_end(&mut buffer)?;
        parse_fasta_from_bytes(&buffer)
    } else {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        parse_fasta_from_bytes(&mmap[..])
    }
}
