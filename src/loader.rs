//! Loader: turns a `.vmc` executable into a flat memory image ready to run.
//!
//! This is a contract, not an execution engine: it validates the
//! executable, concatenates text and data into one buffer, and hands back
//! the entry point. What a caller does with that image is out of scope
//! here.

use crate::exe::{self, Executable};

/// A flat memory image plus the metadata needed to start running it.
#[derive(Debug, Clone)]
pub struct Image {
    pub memory: Vec<u8>,
    pub entry: u32,
    pub text_len: u32,
    pub data_len: u32,
    pub base: u32,
}

/// Load `bytes` (the contents of a `.vmc` file) into an [`Image`] whose text
/// and data sections start at `base` in the returned memory buffer (the
/// bytes before `base` are zero-filled). There is no fixed load address
/// defined by this system, so callers pass 0 unless they need the sections
/// placed elsewhere.
pub fn load(path: &str, bytes: Vec<u8>, base: u32) -> Result<Image, Error> {
    let Executable { text, data, entry, .. } = exe::read(path, bytes).map_err(Error::Format)?;
    let text_len = text.len() as u32;
    let data_len = data.len() as u32;
    if entry > text_len + data_len {
        return Err(Error::EntryOutOfRange { path: path.to_string(), entry, bound: text_len + data_len });
    }

    let mut memory = Vec::with_capacity(base as usize + text.len() + data.len());
    memory.resize(base as usize, 0);
    memory.extend_from_slice(&text);
    memory.extend_from_slice(&data);

    Ok(Image { memory, entry: base + entry, text_len, data_len, base })
}

/// An error raised while loading an executable.
#[derive(Debug)]
pub enum Error {
    Format(exe::Error),
    EntryOutOfRange { path: String, entry: u32, bound: u32 },
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Format(e) => write!(f, "{e}"),
            Error::EntryOutOfRange { path, entry, bound } => {
                write!(f, "load error: {path}: entry point {entry} exceeds image size {bound}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exe as exe_mod, lexer, linker, object, parser};

    fn build_executable(src: &str) -> Vec<u8> {
        let module = parser::parse(&lexer::lex(src).unwrap()).unwrap();
        let object_bytes = object::write(&module);
        let object_file = object::read("a.vmo", object_bytes).unwrap();
        let image = linker::link(&[object_file]).unwrap();
        exe_mod::write(&image)
    }

    #[test]
    fn loads_entry_and_section_lengths() {
        let bytes = build_executable(".global main\nmain:\nldi r0, 1\nhalt\n");
        let image = load("a.vmc", bytes, 0).unwrap();
        assert_eq!(image.entry, 0);
        assert_eq!(image.text_len, 16);
        assert_eq!(image.data_len, 0);
        assert_eq!(image.memory.len(), 16);
    }

    #[test]
    fn memory_is_text_then_data() {
        let bytes = build_executable(".data\n.byte 9\n.text\nmain:\nhalt\n");
        let image = load("a.vmc", bytes, 0).unwrap();
        assert_eq!(image.text_len, 8);
        assert_eq!(image.data_len, 1);
        assert_eq!(image.memory[8], 9);
    }

    #[test]
    fn rejects_truncated_file() {
        let err = load("short.vmc", vec![0u8; 4], 0).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn base_offset_pads_and_shifts_entry() {
        let bytes = build_executable(".global main\nmain:\nldi r0, 1\nhalt\n");
        let image = load("a.vmc", bytes, 0x1000).unwrap();
        assert_eq!(image.base, 0x1000);
        assert_eq!(image.entry, 0x1000);
        assert_eq!(image.memory.len(), 0x1000 + 16);
        assert!(image.memory[..0x1000].iter().all(|&b| b == 0));
    }
}
