//! End-to-end scenarios across the whole assemble → link → load pipeline.

use vmtool::{exe, lexer, linker, loader, object, parser};

fn assemble_object(path: &str, src: &str) -> object::ObjectFile {
    let module = parser::parse(&lexer::lex(src).unwrap()).unwrap();
    let bytes = object::write(&module);
    object::read(path, bytes).unwrap()
}

#[test]
fn s1_assembler_smoke() {
    let module = vmtool::assemble("ldi r1, 0x2A\nhalt\n").unwrap();
    let bytes = object::write(&module);
    assert_eq!(&bytes[0..8], &[0x46, 0x4F, 0x4D, 0x56, 0x02, 0x00, 0x00, 0x00]);
    assert_eq!(
        &bytes[object::HEADER_SIZE as usize..object::HEADER_SIZE as usize + 16],
        &[0x01, 0x01, 0x00, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
    assert_eq!(bytes.len(), object::HEADER_SIZE as usize + 16);

    let obj = object::read("s1.vmo", bytes).unwrap();
    assert!(obj.symbols.is_empty());
    assert!(obj.relocations.is_empty());
}

#[test]
fn s2_label_and_branch() {
    let module = vmtool::assemble("L: beq r0, r0, L\n").unwrap();
    assert_eq!(module.text.len(), 1);
    let instr = &module.text[0];
    assert_eq!(instr.opcode as u8, parser::Opcode::Beq as u8);
    assert_eq!((instr.rd, instr.rs1, instr.rs2, instr.imm), (0, 0, 0, 0));

    assert_eq!(module.symbols.len(), 1);
    assert_eq!(module.symbols[0].name, "L");
    assert_eq!(module.symbols[0].section as u8, parser::Section::Text as u8);
    assert_eq!(module.symbols[0].value, 0);
    assert!(!module.symbols[0].global);

    assert_eq!(module.relocations.len(), 1);
    assert_eq!(module.relocations[0].section as u8, parser::Section::Text as u8);
    assert_eq!(module.relocations[0].reloc_type, 0);
    assert_eq!(module.relocations[0].offset, 4);
    assert_eq!(module.relocations[0].name, "L");
}

#[test]
fn s3_macro_expansion() {
    let module = vmtool::assemble(".macro INC 1\nadd $1, $1, $1\n.endm\nINC r3\n").unwrap();
    let bytes = object::write(&module);
    let text = &bytes[object::HEADER_SIZE as usize..object::HEADER_SIZE as usize + 8];
    assert_eq!(text, &[0x03, 0x03, 0x03, 0x03, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn s4_data_relocation() {
    let module = vmtool::assemble(".data\nptr:\n.word main\n.text\nmain:\nhalt\n").unwrap();
    let ptr = module.symbols.iter().find(|s| s.name == "ptr").unwrap();
    assert_eq!(ptr.section as u8, parser::Section::Data as u8);
    assert_eq!(ptr.value, 0);
    let main = module.symbols.iter().find(|s| s.name == "main").unwrap();
    assert_eq!(main.section as u8, parser::Section::Text as u8);
    assert_eq!(main.value, 0);
    assert_eq!(module.relocations.len(), 1);
    assert_eq!(module.relocations[0].section as u8, parser::Section::Data as u8);
    assert_eq!(module.relocations[0].offset, 0);
    assert_eq!(module.relocations[0].name, "main");

    let bytes = object::write(&module);
    let obj = object::read("s4.vmo", bytes).unwrap();
    let image = linker::link(&[obj]).unwrap();
    assert_eq!(&image.data[0..4], &[0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn s5_two_object_link_and_executable_trailer() {
    let a = assemble_object("a.vmo", ".global main\nmain:\nldi r0, 1\nldi r1, 2\n");
    let b = assemble_object("b.vmo", ".global helper\nhelper:\njmp main\n");

    let image = linker::link(&[a, b]).unwrap();
    assert_eq!(image.text.len(), 24);
    let main_addr = image.symbols.iter().find(|s| s.name == "main").unwrap().value;
    let helper_addr = image.symbols.iter().find(|s| s.name == "helper").unwrap().value;
    assert_eq!(main_addr, 0);
    assert_eq!(helper_addr, 16);
    assert_eq!(&image.text[20..24], &[0x00, 0x00, 0x00, 0x00]);

    let bytes = exe::write(&image);
    assert_eq!(&bytes[bytes.len() - 8..], &[0x45, 0x4E, 0x54, 0x52, 0x00, 0x00, 0x00, 0x00]);

    let loaded = loader::load("out.vmc", bytes, 0).unwrap();
    assert_eq!(loaded.entry, 0);
    assert_eq!(loaded.text_len, 24);
}

#[test]
fn s6_duplicate_and_undefined_errors() {
    let a = assemble_object("a.vmo", ".global main\nmain:\nhalt\n");
    let b = assemble_object("b.vmo", ".global main\nmain:\nret\n");
    let err = linker::link(&[a, b]).unwrap_err();
    match err {
        linker::Error::DuplicateSymbol { name, first_path, second_path } => {
            assert_eq!(name, "main");
            assert_eq!(first_path, "a.vmo");
            assert_eq!(second_path, "b.vmo");
        }
        other => panic!("expected DuplicateSymbol, got {other:?}"),
    }

    let b_alone = assemble_object("b.vmo", ".global helper\nhelper:\njmp main\n");
    let err = linker::link(&[b_alone]).unwrap_err();
    match err {
        linker::Error::UndefinedReferences { names } => assert_eq!(names, vec!["main".to_string()]),
        other => panic!("expected UndefinedReferences, got {other:?}"),
    }
}

#[test]
fn full_pipeline_assemble_link_load() {
    let module = vmtool::assemble(".global main\nmain:\nldi r0, 0x2A\nhalt\n").unwrap();
    let object_bytes = object::write(&module);
    let obj = object::read("prog.vmo", object_bytes).unwrap();
    let image = linker::link(&[obj]).unwrap();
    let exe_bytes = exe::write(&image);
    let loaded = loader::load("prog.vmc", exe_bytes, 0).unwrap();
    assert_eq!(loaded.entry, 0);
    assert_eq!(loaded.memory.len(), 16);
    assert_eq!(&loaded.memory[0..8], &[0x01, 0x00, 0x00, 0x00, 0x2A, 0x00, 0x00, 0x00]);
}
