//! Executable-file (`.vmc`) writer and reader. Shares the 40-byte header
//! and blob layout with [`crate::object`]: same magic-prefixed framing, a
//! different magic, an always-empty relocation table, and an 8-byte
//! `ENTR` + entry-point trailer appended after everything else.

use crate::bytes;
use crate::linker::LinkedImage;
use crate::object::{self, Header};
use crate::parser::Symbol;

/// `"VMCE"` as a little-endian u32.
pub const MAGIC: u32 = 0x45434D56;
const TRAILER_TAG: [u8; 4] = *b"ENTR";
const TRAILER_SIZE: usize = 8;

/// A loaded (but not yet mapped into memory) executable.
#[derive(Debug, Clone)]
pub struct Executable {
    pub path: String,
    pub text: Vec<u8>,
    pub data: Vec<u8>,
    pub symbols: Vec<Symbol>,
    pub entry: u32,
}

/// Serialize a [`LinkedImage`] into `.vmc` bytes.
pub fn write(image: &LinkedImage) -> Vec<u8> {
    let mut sym_blob = Vec::new();
    for sym in &image.symbols {
        object::write_symbol(&mut sym_blob, sym);
    }

    let mut out = object::assemble_file(MAGIC, &image.text, &image.data, image.symbols.len() as u32, &sym_blob, 0, &[]);
    out.extend_from_slice(&TRAILER_TAG);
    bytes::write_u32(&mut out, image.entry);
    out
}

/// Parse a `.vmc` file's bytes into an [`Executable`].
pub fn read(path: &str, raw: Vec<u8>) -> Result<Executable, Error> {
    let header: Header = object::parse_header(&raw, MAGIC, path).map_err(Error::Format)?;
    let text = raw
        .get(header.text_off as usize..(header.text_off + header.text_size) as usize)
        .ok_or_else(|| Error::Truncated { path: path.to_string(), what: "text section" })?
        .to_vec();
    let data = raw
        .get(header.data_off as usize..(header.data_off + header.data_size) as usize)
        .ok_or_else(|| Error::Truncated { path: path.to_string(), what: "data section" })?
        .to_vec();
    let symbols = object::parse_symbols(&raw, header.sym_off, header.sym_count, path).map_err(Error::Format)?;

    // rel_count is always 0 for an executable, so the trailer sits right at
    // rel_off with no relocation blob in between.
    let trailer_off = header.rel_off as usize;
    let trailer =
        raw.get(trailer_off..trailer_off + TRAILER_SIZE).ok_or_else(|| Error::Truncated { path: path.to_string(), what: "entry trailer" })?;
    if trailer[0..4] != TRAILER_TAG {
        return Err(Error::BadTrailer { path: path.to_string() });
    }
    let entry = bytes::read_u32(trailer, 4).unwrap();

    Ok(Executable { path: path.to_string(), text, data, symbols, entry })
}

/// An error raised while writing or reading an executable.
#[derive(Debug)]
pub enum Error {
    Format(object::Error),
    Truncated { path: String, what: &'static str },
    BadTrailer { path: String },
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Format(e) => write!(f, "{e}"),
            Error::Truncated { path, what } => write!(f, "format error: {path}: truncated {what}"),
            Error::BadTrailer { path } => write!(f, "format error: {path}: missing or corrupt entry trailer"),
        }
    }
}
