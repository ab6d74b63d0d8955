//! Object-file (`.vmo`) writer and reader, plus the shared framing logic
//! the executable writer/reader (see [`crate::exe`]) reuses for its
//! near-identical `.vmc` layout.

use crate::bytes;
use crate::parser::{Module, Relocation, Section, Symbol};

/// `"VMOF"` as a little-endian u32.
pub const MAGIC: u32 = 0x564D_4F46;
pub const VERSION: u16 = 2;
pub const HEADER_SIZE: u32 = 40;

/// The fixed 40-byte header shared by `.vmo` and `.vmc`.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub magic: u32,
    pub version: u16,
    pub flags: u16,
    pub text_off: u32,
    pub text_size: u32,
    pub data_off: u32,
    pub data_size: u32,
    pub sym_off: u32,
    pub sym_count: u32,
    pub rel_off: u32,
    pub rel_count: u32,
}

/// An object file read back into memory: sections, symbols, relocations.
#[derive(Debug, Clone)]
pub struct ObjectFile {
    pub path: String,
    pub raw: Vec<u8>,
    pub text: Vec<u8>,
    pub data: Vec<u8>,
    pub symbols: Vec<Symbol>,
    pub relocations: Vec<Relocation>,
}

/// Encode a single instruction into its 8-byte record.
fn encode_instruction(instr: &crate::parser::Instruction) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0] = instr.opcode.as_u8();
    out[1] = instr.rd;
    out[2] = instr.rs1;
    out[3] = instr.rs2;
    out[4..8].copy_from_slice(&instr.imm.to_le_bytes());
    out
}

fn section_code(section: Section) -> u16 {
    section as u16
}

fn section_from_code(code: u16, path: &str) -> Result<Section, Error> {
    match code {
        0 => Ok(Section::Undef),
        1 => Ok(Section::Text),
        2 => Ok(Section::Data),
        other => Err(Error::BadSection { path: path.to_string(), code: other }),
    }
}

pub(crate) fn write_symbol(buf: &mut Vec<u8>, sym: &Symbol) {
    bytes::write_u16(buf, section_code(sym.section));
    bytes::write_u16(buf, if sym.global { 1 } else { 0 });
    bytes::write_u32(buf, sym.value);
    let name = sym.name.as_bytes();
    bytes::write_u16(buf, name.len() as u16);
    buf.extend_from_slice(name);
}

fn write_relocation(buf: &mut Vec<u8>, rel: &Relocation) {
    bytes::write_u16(buf, section_code(rel.section));
    bytes::write_u16(buf, rel.reloc_type);
    bytes::write_u32(buf, rel.offset);
    let name = rel.name.as_bytes();
    bytes::write_u16(buf, name.len() as u16);
    buf.extend_from_slice(name);
}

/// Serialize a parsed [`Module`] into `.vmo` bytes.
pub fn write(module: &Module) -> Vec<u8> {
    let mut text_bytes = Vec::with_capacity(module.text.len() * 8);
    for instr in &module.text {
        text_bytes.extend_from_slice(&encode_instruction(instr));
    }

    let mut sym_blob = Vec::new();
    for sym in &module.symbols {
        write_symbol(&mut sym_blob, sym);
    }

    let mut rel_blob = Vec::new();
    for rel in &module.relocations {
        write_relocation(&mut rel_blob, rel);
    }

    assemble_file(MAGIC, &text_bytes, &module.data, module.symbols.len() as u32, &sym_blob, module.relocations.len() as u32, &rel_blob)
}

/// Stitch a header plus the four blobs into one buffer. Shared by the
/// object writer and the executable writer (which always passes an empty
/// relocation blob).
pub(crate) fn assemble_file(
    magic: u32,
    text: &[u8],
    data: &[u8],
    sym_count: u32,
    sym_blob: &[u8],
    rel_count: u32,
    rel_blob: &[u8],
) -> Vec<u8> {
    let text_off = HEADER_SIZE;
    let text_size = text.len() as u32;
    let data_off = text_off + text_size;
    let data_size = data.len() as u32;
    let sym_off = data_off + data_size;
    let rel_off = sym_off + sym_blob.len() as u32;

    let mut out = Vec::with_capacity(HEADER_SIZE as usize + text.len() + data.len() + sym_blob.len() + rel_blob.len());
    bytes::write_u32(&mut out, magic);
    bytes::write_u16(&mut out, VERSION);
    bytes::write_u16(&mut out, 0);
    bytes::write_u32(&mut out, text_off);
    bytes::write_u32(&mut out, text_size);
    bytes::write_u32(&mut out, data_off);
    bytes::write_u32(&mut out, data_size);
    bytes::write_u32(&mut out, sym_off);
    bytes::write_u32(&mut out, sym_count);
    bytes::write_u32(&mut out, rel_off);
    bytes::write_u32(&mut out, rel_count);
    out.extend_from_slice(text);
    out.extend_from_slice(data);
    out.extend_from_slice(sym_blob);
    out.extend_from_slice(rel_blob);
    out
}

/// Parse the 40-byte header out of `buf`, checking magic and version.
pub(crate) fn parse_header(buf: &[u8], expected_magic: u32, path: &str) -> Result<Header, Error> {
    if buf.len() < HEADER_SIZE as usize {
        return Err(Error::Truncated { path: path.to_string(), what: "header" });
    }
    let magic = bytes::read_u32(buf, 0).unwrap();
    if magic != expected_magic {
        return Err(Error::BadMagic { path: path.to_string(), found: magic });
    }
    let version = bytes::read_u16(buf, 4).unwrap();
    if version != VERSION {
        return Err(Error::UnsupportedVersion { path: path.to_string(), found: version });
    }
    let flags = bytes::read_u16(buf, 6).unwrap();
    let text_off = bytes::read_u32(buf, 8).unwrap();
    let text_size = bytes::read_u32(buf, 12).unwrap();
    let data_off = bytes::read_u32(buf, 16).unwrap();
    let data_size = bytes::read_u32(buf, 20).unwrap();
    let sym_off = bytes::read_u32(buf, 24).unwrap();
    let sym_count = bytes::read_u32(buf, 28).unwrap();
    let rel_off = bytes::read_u32(buf, 32).unwrap();
    let rel_count = bytes::read_u32(buf, 36).unwrap();
    Ok(Header {
        magic,
        version,
        flags,
        text_off,
        text_size,
        data_off,
        data_size,
        sym_off,
        sym_count,
        rel_off,
        rel_count,
    })
}

fn slice_checked<'a>(buf: &'a [u8], off: u32, size: u32, path: &str, what: &'static str) -> Result<&'a [u8], Error> {
    let off = off as usize;
    let end = off.checked_add(size as usize).ok_or(Error::Truncated { path: path.to_string(), what })?;
    buf.get(off..end).ok_or(Error::Truncated { path: path.to_string(), what })
}

fn parse_name(buf: &[u8], offset: &mut usize, path: &str) -> Result<String, Error> {
    let namelen = bytes::read_u16(buf, *offset).ok_or(Error::Truncated { path: path.to_string(), what: "name length" })?;
    *offset += 2;
    let name_bytes = buf
        .get(*offset..*offset + namelen as usize)
        .ok_or(Error::Truncated { path: path.to_string(), what: "symbol or relocation name" })?;
    *offset += namelen as usize;
    String::from_utf8(name_bytes.to_vec()).map_err(|_| Error::Truncated { path: path.to_string(), what: "non-utf8 name" })
}

pub(crate) fn parse_symbols(buf: &[u8], off: u32, count: u32, path: &str) -> Result<Vec<Symbol>, Error> {
    let mut cursor = off as usize;
    let mut symbols = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let section_code = bytes::read_u16(buf, cursor).ok_or(Error::Truncated { path: path.to_string(), what: "symbol record" })?;
        let flags = bytes::read_u16(buf, cursor + 2).ok_or(Error::Truncated { path: path.to_string(), what: "symbol record" })?;
        let value = bytes::read_u32(buf, cursor + 4).ok_or(Error::Truncated { path: path.to_string(), what: "symbol record" })?;
        cursor += 8;
        let name = parse_name(buf, &mut cursor, path)?;
        symbols.push(Symbol {
            name,
            section: section_from_code(section_code, path)?,
            value,
            global: flags & 1 != 0,
        });
    }
    Ok(symbols)
}

pub(crate) fn parse_relocations(buf: &[u8], off: u32, count: u32, path: &str) -> Result<Vec<Relocation>, Error> {
    let mut cursor = off as usize;
    let mut relocations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let section_code = bytes::read_u16(buf, cursor).ok_or(Error::Truncated { path: path.to_string(), what: "relocation record" })?;
        let reloc_type = bytes::read_u16(buf, cursor + 2).ok_or(Error::Truncated { path: path.to_string(), what: "relocation record" })?;
        let offset = bytes::read_u32(buf, cursor + 4).ok_or(Error::Truncated { path: path.to_string(), what: "relocation record" })?;
        cursor += 8;
        let name = parse_name(buf, &mut cursor, path)?;
        relocations.push(Relocation { section: section_from_code(section_code, path)?, reloc_type, offset, name });
    }
    Ok(relocations)
}

/// Parse a `.vmo` file's bytes into an [`ObjectFile`].
pub fn read(path: &str, raw: Vec<u8>) -> Result<ObjectFile, Error> {
    let header = parse_header(&raw, MAGIC, path)?;
    let text = slice_checked(&raw, header.text_off, header.text_size, path, "text section")?.to_vec();
    let data = slice_checked(&raw, header.data_off, header.data_size, path, "data section")?.to_vec();
    let symbols = parse_symbols(&raw, header.sym_off, header.sym_count, path)?;
    let relocations = parse_relocations(&raw, header.rel_off, header.rel_count, path)?;
    let _ = header.flags;
    Ok(ObjectFile { path: path.to_string(), raw, text, data, symbols, relocations })
}

/// A malformed object (or executable) file.
#[derive(Debug)]
pub enum Error {
    BadMagic { path: String, found: u32 },
    UnsupportedVersion { path: String, found: u16 },
    Truncated { path: String, what: &'static str },
    BadSection { path: String, code: u16 },
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BadMagic { path, found } => write!(f, "format error: {path}: bad magic 0x{found:08X}"),
            Error::UnsupportedVersion { path, found } => {
                write!(f, "format error: {path}: unsupported version {found} (expected {VERSION})")
            }
            Error::Truncated { path, what } => write!(f, "format error: {path}: truncated {what}"),
            Error::BadSection { path, code } => write!(f, "format error: {path}: invalid section code {code}"),
        }
    }
}
