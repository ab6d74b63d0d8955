//! Linker core: lays out sections across object files in input order,
//! builds one merged symbol table, checks every reference resolves, and
//! patches absolute-32 relocations into the merged buffers.
//!
//! Every *defined* symbol in every object — not just ones marked
//! `.global` — enters the one merged table; the `.global` flag only
//! controls whether a name can be resolved before its defining object is
//! known (see [`crate::parser`]'s pending-undef handling). Two objects
//! defining the same name, global or not, is a link error.

use crate::object::ObjectFile;
use crate::parser::{Section, Symbol};
use std::collections::HashMap;

/// One entry of the merged symbol table.
#[derive(Debug, Clone)]
struct GlobalSymbol {
    address: u32,
    defining_object: usize,
}

/// The result of a successful link: merged sections, the output symbol
/// table, and the resolved entry point.
#[derive(Debug, Clone)]
pub struct LinkedImage {
    pub text: Vec<u8>,
    pub data: Vec<u8>,
    pub symbols: Vec<Symbol>,
    pub entry: u32,
}

struct Layout {
    text_base: Vec<u32>,
    data_base: Vec<u32>,
    total_text: u32,
}

fn compute_layout(objects: &[ObjectFile]) -> Layout {
    let mut text_base = Vec::with_capacity(objects.len());
    let mut running = 0u32;
    for obj in objects {
        text_base.push(running);
        running += obj.text.len() as u32;
    }
    let total_text = running;

    let mut data_base = Vec::with_capacity(objects.len());
    let mut running = total_text;
    for obj in objects {
        data_base.push(running);
        running += obj.data.len() as u32;
    }

    Layout { text_base, data_base, total_text }
}

fn section_base(layout: &Layout, object_index: usize, section: Section) -> u32 {
    match section {
        Section::Text => layout.text_base[object_index],
        Section::Data => layout.data_base[object_index],
        Section::Undef => 0,
    }
}

/// Link `objects` (already in the caller's desired input order) into one
/// executable image.
pub fn link(objects: &[ObjectFile]) -> Result<LinkedImage, Error> {
    let layout = compute_layout(objects);

    let mut globals: Vec<(String, GlobalSymbol)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (obj_idx, obj) in objects.iter().enumerate() {
        for sym in &obj.symbols {
            if sym.section == Section::Undef {
                continue;
            }
            let address = section_base(&layout, obj_idx, sym.section) + sym.value;
            if let Some(&existing_idx) = index.get(&sym.name) {
                let existing = &globals[existing_idx].1;
                return Err(Error::DuplicateSymbol {
                    name: sym.name.clone(),
                    first_path: objects[existing.defining_object].path.clone(),
                    second_path: obj.path.clone(),
                });
            }
            index.insert(sym.name.clone(), globals.len());
            globals.push((sym.name.clone(), GlobalSymbol { address, defining_object: obj_idx }));
        }
    }

    let mut unresolved: Vec<String> = Vec::new();
    let mut seen_unresolved: HashMap<String, ()> = HashMap::new();
    for obj in objects {
        for rel in &obj.relocations {
            if !index.contains_key(&rel.name) && !seen_unresolved.contains_key(&rel.name) {
                seen_unresolved.insert(rel.name.clone(), ());
                unresolved.push(rel.name.clone());
            }
        }
        for sym in &obj.symbols {
            if sym.section == Section::Undef && !index.contains_key(&sym.name) && !seen_unresolved.contains_key(&sym.name) {
                seen_unresolved.insert(sym.name.clone(), ());
                unresolved.push(sym.name.clone());
            }
        }
    }
    if !unresolved.is_empty() {
        return Err(Error::UndefinedReferences { names: unresolved });
    }

    let mut text: Vec<u8> = Vec::with_capacity(layout.total_text as usize);
    for obj in objects {
        text.extend_from_slice(&obj.text);
    }
    let mut data: Vec<u8> = Vec::new();
    for obj in objects {
        data.extend_from_slice(&obj.data);
    }

    for (obj_idx, obj) in objects.iter().enumerate() {
        for rel in &obj.relocations {
            if rel.reloc_type != 0 {
                return Err(Error::UnsupportedRelocationType { reloc_type: rel.reloc_type, path: obj.path.clone() });
            }
            let write_offset = section_base(&layout, obj_idx, rel.section) as usize + rel.offset as usize;
            let buffer = match rel.section {
                Section::Text => &mut text,
                Section::Data => &mut data,
                Section::Undef => return Err(Error::UnsupportedRelocationType { reloc_type: rel.reloc_type, path: obj.path.clone() }),
            };
            if write_offset + 4 > buffer.len() {
                return Err(Error::RelocationOutOfBounds { path: obj.path.clone(), offset: rel.offset });
            }
            let target = &globals[index[&rel.name]].1;
            buffer[write_offset..write_offset + 4].copy_from_slice(&target.address.to_le_bytes());
        }
    }

    let entry = index.get("main").map(|&i| globals[i].1.address).unwrap_or(0);

    let symbols = globals
        .into_iter()
        .map(|(name, g)| Symbol {
            name,
            section: if g.address >= layout.total_text { Section::Data } else { Section::Text },
            value: g.address,
            global: true,
        })
        .collect();

    Ok(LinkedImage { text, data, symbols, entry })
}

/// An error raised while linking.
#[derive(Debug)]
pub enum Error {
    DuplicateSymbol { name: String, first_path: String, second_path: String },
    UndefinedReferences { names: Vec<String> },
    UnsupportedRelocationType { reloc_type: u16, path: String },
    RelocationOutOfBounds { path: String, offset: u32 },
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DuplicateSymbol { name, first_path, second_path } => write!(
                f,
                "link error: duplicate definition of \"{name}\" in {first_path} and {second_path}"
            ),
            Error::UndefinedReferences { names } => {
                write!(f, "link error: undefined reference(s): {}", names.join(", "))
            }
            Error::UnsupportedRelocationType { reloc_type, path } => {
                write!(f, "link error: unsupported relocation type {reloc_type} in {path}")
            }
            Error::RelocationOutOfBounds { path, offset } => {
                write!(f, "link error: relocation at offset {offset} in {path} writes out of bounds")
            }
        }
    }
}
