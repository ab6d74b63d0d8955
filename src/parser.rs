//! Single-pass parser: token stream in, a [`Module`] (instructions, data
//! bytes, symbol table, relocations) out.
//!
//! Labels are never resolved here — a symbolic operand is recorded as a
//! deferred `label_ref` plus a relocation, and resolution happens at link
//! time. This keeps the assembler stateless with respect to forward
//! references, at the cost of needing a linker to produce anything runnable.

use crate::lexer::{Token, TokenKind};
use std::collections::HashMap;

/// One of the fifteen instruction opcodes, numbered per the object-format
/// opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Ldi = 1,
    Mov = 2,
    Add = 3,
    Sub = 4,
    And = 5,
    Or = 6,
    Xor = 7,
    Lw = 8,
    Sw = 9,
    Jmp = 10,
    Beq = 11,
    Bne = 12,
    Call = 13,
    Ret = 14,
    Halt = 15,
}

impl Opcode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A single 8-byte instruction record.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub imm: i32,
    pub label_ref: Option<String>,
    pub line: usize,
}

/// Width in bytes of every encoded instruction.
pub const INSTRUCTION_SIZE: u32 = 8;

/// Which section a symbol or relocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Undef = 0,
    Text = 1,
    Data = 2,
}

/// A defined or (if `section == Undef`) externally-referenced symbol.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub section: Section,
    pub value: u32,
    pub global: bool,
}

/// An absolute-32 patch site: at `offset` bytes into `section`, write the
/// final address of `name`.
#[derive(Debug, Clone)]
pub struct Relocation {
    pub section: Section,
    pub reloc_type: u16,
    pub offset: u32,
    pub name: String,
}

/// The output of a single parse: code, data, symbols, relocations, in
/// source order.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub text: Vec<Instruction>,
    pub data: Vec<u8>,
    pub symbols: Vec<Symbol>,
    pub relocations: Vec<Relocation>,
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    section: Section,
    text: Vec<Instruction>,
    data: Vec<u8>,
    symbols: Vec<Symbol>,
    symbol_index: HashMap<String, usize>,
    relocations: Vec<Relocation>,
}

/// Parse a full token stream into a [`Module`].
pub fn parse(tokens: &[Token]) -> Result<Module, Error> {
    let mut p = Parser {
        tokens,
        pos: 0,
        section: Section::Text,
        text: Vec::new(),
        data: Vec::new(),
        symbols: Vec::new(),
        symbol_index: HashMap::new(),
        relocations: Vec::new(),
    };
    p.run()?;
    Ok(Module {
        text: p.text,
        data: p.data,
        symbols: p.symbols,
        relocations: p.relocations,
    })
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> &Token {
        let t = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn text_size(&self) -> u32 {
        self.text.len() as u32 * INSTRUCTION_SIZE
    }

    fn current_section_size(&self) -> u32 {
        match self.section {
            Section::Text => self.text_size(),
            Section::Data => self.data.len() as u32,
            Section::Undef => 0,
        }
    }

    fn run(&mut self) -> Result<(), Error> {
        loop {
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Label => {
                    let tok = self.advance().clone();
                    let name = tok.lexeme.trim_end_matches(':').to_string();
                    self.define_symbol(name, tok.line)?;
                }
                TokenKind::Directive => self.parse_directive()?,
                TokenKind::Ident => {
                    if self.section == Section::Text {
                        self.parse_instruction()?;
                    } else {
                        self.advance();
                    }
                }
                _ => {
                    let tok = self.peek().clone();
                    return Err(Error::UnexpectedToken { line: tok.line, lexeme: tok.lexeme });
                }
            }
        }
        Ok(())
    }

    fn define_symbol(&mut self, name: String, line: usize) -> Result<(), Error> {
        let value = self.current_section_size();
        let section = self.section;
        match self.symbol_index.get(&name).copied() {
            Some(idx) => {
                if self.symbols[idx].section != Section::Undef {
                    return Err(Error::DuplicateSymbol { name, line });
                }
                self.symbols[idx].section = section;
                self.symbols[idx].value = value;
            }
            None => {
                self.symbol_index.insert(name.clone(), self.symbols.len());
                self.symbols.push(Symbol { name, section, value, global: false });
            }
        }
        Ok(())
    }

    fn mark_global(&mut self, name: String) {
        match self.symbol_index.get(&name).copied() {
            Some(idx) => self.symbols[idx].global = true,
            None => {
                self.symbol_index.insert(name.clone(), self.symbols.len());
                self.symbols.push(Symbol { name, section: Section::Undef, value: 0, global: true });
            }
        }
    }

    fn expect_statement_end(&mut self) -> Result<(), Error> {
        match self.peek().kind {
            TokenKind::Newline | TokenKind::Eof => {
                if self.peek().kind == TokenKind::Newline {
                    self.advance();
                }
                Ok(())
            }
            _ => {
                let tok = self.peek().clone();
                Err(Error::UnexpectedToken { line: tok.line, lexeme: tok.lexeme })
            }
        }
    }

    fn parse_directive(&mut self) -> Result<(), Error> {
        let tok = self.advance().clone();
        match tok.lexeme.to_lowercase().as_str() {
            ".text" => {
                self.section = Section::Text;
                self.expect_statement_end()
            }
            ".data" => {
                self.section = Section::Data;
                self.expect_statement_end()
            }
            ".global" => {
                loop {
                    let name_tok = self.expect(TokenKind::Ident)?;
                    self.mark_global(name_tok);
                    if self.peek().kind == TokenKind::Comma {
                        self.advance();
                        continue;
                    }
                    break;
                }
                self.expect_statement_end()
            }
            ".byte" => {
                if self.section != Section::Data {
                    return Err(Error::DirectiveWrongSection { directive: ".byte".into(), line: tok.line });
                }
                loop {
                    let value_tok = self.advance().clone();
                    let value = self.parse_int_token(&value_tok)?;
                    self.data.push(value as u8);
                    if self.peek().kind == TokenKind::Comma {
                        self.advance();
                        continue;
                    }
                    break;
                }
                self.expect_statement_end()
            }
            ".word" => {
                if self.section != Section::Data {
                    return Err(Error::DirectiveWrongSection { directive: ".word".into(), line: tok.line });
                }
                let operand = self.advance().clone();
                if operand.kind == TokenKind::Ident {
                    let offset = self.data.len() as u32;
                    self.data.extend_from_slice(&[0u8; 4]);
                    self.relocations.push(Relocation {
                        section: Section::Data,
                        reloc_type: 0,
                        offset,
                        name: operand.lexeme,
                    });
                } else {
                    let value = self.parse_int_token(&operand)? as u32;
                    self.data.extend_from_slice(&value.to_le_bytes());
                }
                self.expect_statement_end()
            }
            _ => {
                // Unrecognized directive: skip to the next newline.
                while !matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
                    self.advance();
                }
                if self.peek().kind == TokenKind::Newline {
                    self.advance();
                }
                Ok(())
            }
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<String, Error> {
        let tok = self.peek().clone();
        if tok.kind != kind {
            return Err(Error::UnexpectedToken { line: tok.line, lexeme: tok.lexeme });
        }
        self.advance();
        Ok(tok.lexeme)
    }

    fn expect_comma(&mut self) -> Result<(), Error> {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Comma {
            return Err(Error::MissingComma { line: tok.line });
        }
        self.advance();
        Ok(())
    }

    fn parse_register(&mut self) -> Result<u8, Error> {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Register {
            return Err(Error::UnexpectedToken { line: tok.line, lexeme: tok.lexeme });
        }
        self.advance();
        let digits = &tok.lexeme[1..];
        let value: u32 = digits.parse().unwrap();
        if value > 31 {
            return Err(Error::RegisterOutOfRange { value, line: tok.line });
        }
        Ok(value as u8)
    }

    fn parse_int_token(&self, tok: &Token) -> Result<i32, Error> {
        match tok.kind {
            TokenKind::HexInt => i64::from_str_radix(&tok.lexeme[2..], 16)
                .map(|v| v as i32)
                .map_err(|_| Error::InvalidImmediate { lexeme: tok.lexeme.clone(), line: tok.line }),
            TokenKind::BinInt => i64::from_str_radix(&tok.lexeme[2..], 2)
                .map(|v| v as i32)
                .map_err(|_| Error::InvalidImmediate { lexeme: tok.lexeme.clone(), line: tok.line }),
            TokenKind::DecInt => tok
                .lexeme
                .parse::<i32>()
                .map_err(|_| Error::InvalidImmediate { lexeme: tok.lexeme.clone(), line: tok.line }),
            _ => Err(Error::InvalidImmediate { lexeme: tok.lexeme.clone(), line: tok.line }),
        }
    }

    /// Parse a label-or-integer operand, deferring resolution for labels.
    fn parse_label_or_int(&mut self) -> Result<(i32, Option<String>), Error> {
        let tok = self.peek().clone();
        if tok.kind == TokenKind::Ident {
            self.advance();
            Ok((0, Some(tok.lexeme)))
        } else {
            let value = self.parse_int_token(&tok)?;
            self.advance();
            Ok((value, None))
        }
    }

    /// Parse an integer-only operand. Unlike [`Self::parse_label_or_int`],
    /// an identifier here is a hard parse error rather than a deferred
    /// symbol reference.
    fn parse_int(&mut self) -> Result<i32, Error> {
        let tok = self.peek().clone();
        if tok.kind == TokenKind::Ident {
            return Err(Error::InvalidImmediate { lexeme: tok.lexeme, line: tok.line });
        }
        let value = self.parse_int_token(&tok)?;
        self.advance();
        Ok(value)
    }

    fn push_instruction(&mut self, instruction: Instruction) {
        let has_label = instruction.label_ref.is_some();
        let name = instruction.label_ref.clone();
        self.text.push(instruction);
        if has_label {
            let k = self.text.len() as u32 - 1;
            self.relocations.push(Relocation {
                section: Section::Text,
                reloc_type: 0,
                offset: k * INSTRUCTION_SIZE + 4,
                name: name.unwrap(),
            });
        }
    }

    fn parse_instruction(&mut self) -> Result<(), Error> {
        let tok = self.advance().clone();
        let mnemonic = tok.lexeme.to_uppercase();
        let line = tok.line;

        macro_rules! inst {
            ($opcode:expr, $rd:expr, $rs1:expr, $rs2:expr, $imm:expr, $label:expr) => {
                Instruction { opcode: $opcode, rd: $rd, rs1: $rs1, rs2: $rs2, imm: $imm, label_ref: $label, line }
            };
        }

        match mnemonic.as_str() {
            "LDI" => {
                let rd = self.parse_register()?;
                self.expect_comma()?;
                let imm = self.parse_int()?;
                self.push_instruction(inst!(Opcode::Ldi, rd, 0, 0, imm, None));
            }
            "MOV" => {
                let rd = self.parse_register()?;
                self.expect_comma()?;
                let rs1 = self.parse_register()?;
                self.push_instruction(inst!(Opcode::Mov, rd, rs1, 0, 0, None));
            }
            "ADD" | "SUB" | "AND" | "OR" | "XOR" => {
                let rd = self.parse_register()?;
                self.expect_comma()?;
                let rs1 = self.parse_register()?;
                self.expect_comma()?;
                let rs2 = self.parse_register()?;
                let opcode = match mnemonic.as_str() {
                    "ADD" => Opcode::Add,
                    "SUB" => Opcode::Sub,
                    "AND" => Opcode::And,
                    "OR" => Opcode::Or,
                    "XOR" => Opcode::Xor,
                    _ => unreachable!(),
                };
                self.push_instruction(inst!(opcode, rd, rs1, rs2, 0, None));
            }
            "LW" => {
                let rd = self.parse_register()?;
                self.expect_comma()?;
                self.expect(TokenKind::LBrack)?;
                let rs1 = self.parse_register()?;
                self.expect(TokenKind::RBrack)?;
                self.push_instruction(inst!(Opcode::Lw, rd, rs1, 0, 0, None));
            }
            "SW" => {
                let rs2 = self.parse_register()?;
                self.expect_comma()?;
                self.expect(TokenKind::LBrack)?;
                let rs1 = self.parse_register()?;
                self.expect(TokenKind::RBrack)?;
                self.push_instruction(inst!(Opcode::Sw, 0, rs1, rs2, 0, None));
            }
            "JMP" | "CALL" => {
                let (imm, label) = self.parse_label_or_int()?;
                let opcode = if mnemonic == "JMP" { Opcode::Jmp } else { Opcode::Call };
                self.push_instruction(inst!(opcode, 0, 0, 0, imm, label));
            }
            "BEQ" | "BNE" => {
                let rs1 = self.parse_register()?;
                self.expect_comma()?;
                let rs2 = self.parse_register()?;
                self.expect_comma()?;
                let (imm, label) = self.parse_label_or_int()?;
                let opcode = if mnemonic == "BEQ" { Opcode::Beq } else { Opcode::Bne };
                self.push_instruction(inst!(opcode, 0, rs1, rs2, imm, label));
            }
            "RET" => self.push_instruction(inst!(Opcode::Ret, 0, 0, 0, 0, None)),
            "HALT" => self.push_instruction(inst!(Opcode::Halt, 0, 0, 0, 0, None)),
            _ => return Err(Error::UnknownMnemonic { mnemonic: tok.lexeme, line }),
        }

        self.expect_statement_end()
    }
}

/// An error raised while parsing.
#[derive(Debug)]
pub enum Error {
    UnknownMnemonic { mnemonic: String, line: usize },
    UnexpectedToken { line: usize, lexeme: String },
    MissingComma { line: usize },
    RegisterOutOfRange { value: u32, line: usize },
    InvalidImmediate { lexeme: String, line: usize },
    DuplicateSymbol { name: String, line: usize },
    DirectiveWrongSection { directive: String, line: usize },
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownMnemonic { mnemonic, line } => {
                write!(f, "parse error: unknown instruction \"{mnemonic}\" at line {line}")
            }
            Error::UnexpectedToken { line, lexeme } => {
                write!(f, "parse error: unexpected token \"{lexeme}\" at line {line}")
            }
            Error::MissingComma { line } => write!(f, "parse error: expected comma at line {line}"),
            Error::RegisterOutOfRange { value, line } => {
                write!(f, "parse error: register r{value} out of range (0..=31) at line {line}")
            }
            Error::InvalidImmediate { lexeme, line } => {
                write!(f, "parse error: invalid immediate \"{lexeme}\" at line {line}")
            }
            Error::DuplicateSymbol { name, line } => {
                write!(f, "symbol error: duplicate definition of \"{name}\" at line {line}")
            }
            Error::DirectiveWrongSection { directive, line } => {
                write!(f, "parse error: {directive} is only valid in the data section, at line {line}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source(src: &str) -> Module {
        parse(&lex(src).unwrap()).unwrap()
    }

    #[test]
    fn simple_instructions() {
        let m = parse_source("ldi r1, 0x2A\nhalt\n");
        assert_eq!(m.text.len(), 2);
        assert_eq!(m.text[0].opcode as u8, Opcode::Ldi as u8);
        assert_eq!(m.text[0].rd, 1);
        assert_eq!(m.text[0].imm, 0x2A);
        assert_eq!(m.text[1].opcode as u8, Opcode::Halt as u8);
        assert!(m.symbols.is_empty());
        assert!(m.relocations.is_empty());
    }

    #[test]
    fn ldi_rejects_label_operand() {
        let err = parse(&lex("ldi r0, foo\n").unwrap()).unwrap_err();
        assert!(matches!(err, Error::InvalidImmediate { lexeme, .. } if lexeme == "foo"));
    }

    #[test]
    fn label_and_branch_produce_text_relocation() {
        let m = parse_source("L: beq r0, r0, L\n");
        assert_eq!(m.text.len(), 1);
        assert_eq!(m.symbols.len(), 1);
        assert_eq!(m.symbols[0].name, "L");
        assert_eq!(m.symbols[0].section as u8, Section::Text as u8);
        assert_eq!(m.symbols[0].value, 0);
        assert!(!m.symbols[0].global);
        assert_eq!(m.relocations.len(), 1);
        assert_eq!(m.relocations[0].offset, 4);
        assert_eq!(m.relocations[0].name, "L");
    }

    #[test]
    fn data_word_symbol_produces_data_relocation() {
        let m = parse_source(".data\nptr:\n.word main\n.text\nmain:\nhalt\n");
        assert_eq!(m.data, vec![0, 0, 0, 0]);
        assert_eq!(m.relocations.len(), 1);
        assert_eq!(m.relocations[0].section as u8, Section::Data as u8);
        assert_eq!(m.relocations[0].offset, 0);
        assert_eq!(m.relocations[0].name, "main");

        let ptr = m.symbols.iter().find(|s| s.name == "ptr").unwrap();
        assert_eq!(ptr.section as u8, Section::Data as u8);
        assert_eq!(ptr.value, 0);
        let main = m.symbols.iter().find(|s| s.name == "main").unwrap();
        assert_eq!(main.section as u8, Section::Text as u8);
        assert_eq!(main.value, 0);
    }

    #[test]
    fn global_before_definition_is_marked_global_when_defined() {
        let m = parse_source(".global main\nmain:\nhalt\n");
        let main = m.symbols.iter().find(|s| s.name == "main").unwrap();
        assert!(main.global);
        assert_eq!(main.section as u8, Section::Text as u8);
    }

    #[test]
    fn global_never_defined_becomes_undef_entry() {
        let m = parse_source(".global missing\nhalt\n");
        let sym = m.symbols.iter().find(|s| s.name == "missing").unwrap();
        assert!(sym.global);
        assert_eq!(sym.section as u8, Section::Undef as u8);
        assert_eq!(sym.value, 0);
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let err = parse(&lex("L:\nhalt\nL:\nret\n").unwrap()).unwrap_err();
        assert!(matches!(err, Error::DuplicateSymbol { .. }));
    }

    #[test]
    fn byte_directive_outside_data_is_an_error() {
        let err = parse(&lex(".byte 1\n").unwrap()).unwrap_err();
        assert!(matches!(err, Error::DirectiveWrongSection { .. }));
    }

    #[test]
    fn register_out_of_range_is_an_error() {
        let err = parse(&lex("mov r32, r0\n").unwrap()).unwrap_err();
        assert!(matches!(err, Error::RegisterOutOfRange { .. }));
    }

    #[test]
    fn unknown_mnemonic_is_an_error() {
        let err = parse(&lex("frobnicate r0\n").unwrap()).unwrap_err();
        assert!(matches!(err, Error::UnknownMnemonic { .. }));
    }

    #[test]
    fn lw_and_sw_use_bracketed_register() {
        let m = parse_source("lw r1, [r2]\nsw r3, [r4]\n");
        assert_eq!(m.text[0].rd, 1);
        assert_eq!(m.text[0].rs1, 2);
        assert_eq!(m.text[1].rs2, 3);
        assert_eq!(m.text[1].rs1, 4);
    }

    #[test]
    fn unrecognized_directive_is_skipped() {
        let m = parse_source(".align 4\nhalt\n");
        assert_eq!(m.text.len(), 1);
    }
}
