//! Binary encoding for the `.nmc` compiled-script artifact.
//!
//! Layout (little-endian):
//!   magic: [u8; 4]       = b"NMC1"
//!   version: u32         = (major << 16) | (minor << 8) | patch; only major
//!                          is checked on read, minor/patch are advisory
//!   instruction_count: u32
//!   instructions: [ (u8 opcode, u32 operand) ]
//!   string_count: u32
//!   strings: [ (u32 len, [u8; len] utf8) ]
//!   scene_count: u32
//!   scenes: [ (u32 len, [u8; len] name, u32 entry_ip) ]
//!   character_count: u32
//!   characters: [ (u32 len, [u8; len] id, u32 len, [u8; len] display_name,
//!                  u32 len, [u8; len] color) ]
//!
//! No variable-type table is written; that map is a compiler-internal aid
//! and is reconstructed from source on recompile, not carried in the
//! artifact.

use std::io::{self, Read, Write};

use crate::bytecode::{CompiledCharacter, CompiledScript, Instruction, Opcode};

const MAGIC: &[u8; 4] = b"NMC1";
const VERSION_MAJOR: u32 = 1;
const VERSION_MINOR: u32 = 0;
const VERSION_PATCH: u32 = 0;
const VERSION: u32 = (VERSION_MAJOR << 16) | (VERSION_MINOR << 8) | VERSION_PATCH;

fn version_major(version: u32) -> u32 {
    version >> 16
}

#[derive(Debug)]
pub enum CodecError {
    BadMagic,
    UnsupportedVersion { found: u32 },
    Io(io::Error),
    Truncated,
    InvalidUtf8,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::BadMagic => write!(f, "not an NMC artifact (bad magic bytes)"),
            CodecError::UnsupportedVersion { found } => {
                write!(
                    f,
                    "unsupported NMC version {found} (major {}), expected major {VERSION_MAJOR}",
                    version_major(*found)
                )
            }
            CodecError::Io(err) => write!(f, "io error: {err}"),
            CodecError::Truncated => write!(f, "truncated NMC artifact"),
            CodecError::InvalidUtf8 => write!(f, "invalid utf-8 in NMC artifact"),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        CodecError::Io(err)
    }
}

/// Encodes `script` into the `.nmc` binary format.
pub fn write<W: Write>(script: &CompiledScript, out: &mut W) -> Result<(), CodecError> {
    out.write_all(MAGIC)?;
    write_u32(out, VERSION)?;

    write_u32(out, script.instructions.len() as u32)?;
    for instr in &script.instructions {
        out.write_all(&[instr.opcode.as_u8()])?;
        write_u32(out, instr.operand)?;
    }

    write_u32(out, script.string_table.len() as u32)?;
    for s in &script.string_table {
        write_string(out, s)?;
    }

    write_u32(out, script.scene_entry_points.len() as u32)?;
    for (name, ip) in &script.scene_entry_points {
        write_string(out, name)?;
        write_u32(out, *ip)?;
    }

    write_u32(out, script.characters.len() as u32)?;
    for (id, decl) in &script.characters {
        write_string(out, id)?;
        write_string(out, &decl.display_name)?;
        write_string(out, &decl.color)?;
    }

    Ok(())
}

/// Decodes a `.nmc` artifact previously produced by [`write`].
pub fn read<R: Read>(input: &mut R) -> Result<CompiledScript, CodecError> {
    let mut magic = [0u8; 4];
    read_exact(input, &mut magic)?;
    if &magic != MAGIC {
        return Err(CodecError::BadMagic);
    }

    let version = read_u32(input)?;
    if version_major(version) != VERSION_MAJOR {
        return Err(CodecError::UnsupportedVersion { found: version });
    }

    let instruction_count = read_u32(input)?;
    let mut instructions = Vec::with_capacity(instruction_count as usize);
    for _ in 0..instruction_count {
        let mut op_byte = [0u8; 1];
        read_exact(input, &mut op_byte)?;
        let opcode = Opcode::try_from(op_byte[0]).map_err(|_| CodecError::Truncated)?;
        let operand = read_u32(input)?;
        instructions.push(Instruction::new(opcode, operand));
    }

    let string_count = read_u32(input)?;
    let mut string_table = Vec::with_capacity(string_count as usize);
    for _ in 0..string_count {
        string_table.push(read_string(input)?);
    }

    let scene_count = read_u32(input)?;
    let mut scene_entry_points = Vec::with_capacity(scene_count as usize);
    for _ in 0..scene_count {
        let name = read_string(input)?;
        let ip = read_u32(input)?;
        scene_entry_points.push((name, ip));
    }

    let character_count = read_u32(input)?;
    let mut characters = Vec::with_capacity(character_count as usize);
    for _ in 0..character_count {
        let id = read_string(input)?;
        let display_name = read_string(input)?;
        let color = read_string(input)?;
        characters.push((
            id.clone(),
            CompiledCharacter {
                id,
                display_name,
                color,
            },
        ));
    }

    Ok(CompiledScript {
        instructions,
        string_table,
        scene_entry_points,
        characters,
        variable_types: None,
    })
}

fn write_u32<W: Write>(out: &mut W, value: u32) -> Result<(), CodecError> {
    out.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_string<W: Write>(out: &mut W, s: &str) -> Result<(), CodecError> {
    write_u32(out, s.len() as u32)?;
    out.write_all(s.as_bytes())?;
    Ok(())
}

fn read_exact<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<(), CodecError> {
    input.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => CodecError::Truncated,
        _ => CodecError::Io(err),
    })
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32, CodecError> {
    let mut buf = [0u8; 4];
    read_exact(input, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_string<R: Read>(input: &mut R) -> Result<String, CodecError> {
    let len = read_u32(input)? as usize;
    let mut buf = vec![0u8; len];
    read_exact(input, &mut buf)?;
    String::from_utf8(buf).map_err(|_| CodecError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_script() -> CompiledScript {
        let mut script = CompiledScript::new();
        script.string_table.push("Alice".into());
        script.string_table.push("Hello!".into());
        script
            .instructions
            .push(Instruction::new(Opcode::PushString, 0));
        script.instructions.push(Instruction::bare(Opcode::Say));
        script.instructions.push(Instruction::bare(Opcode::Halt));
        script.scene_entry_points.push(("intro".into(), 0));
        script.characters.push((
            "alice".into(),
            CompiledCharacter {
                id: "alice".into(),
                display_name: "Alice".into(),
                color: "#ff0000".into(),
            },
        ));
        script
    }

    #[test]
    fn round_trips_byte_for_byte() {
        let script = sample_script();
        let mut buf = Vec::new();
        write(&script, &mut buf).unwrap();

        let decoded = read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, script);

        let mut buf2 = Vec::new();
        write(&decoded, &mut buf2).unwrap();
        assert_eq!(buf, buf2);
    }

    #[test]
    fn round_trips_through_a_tempfile() {
        let script = sample_script();
        let mut file = tempfile::tempfile().unwrap();
        write(&script, &mut file).unwrap();

        use std::io::Seek;
        file.seek(io::SeekFrom::Start(0)).unwrap();
        let decoded = read(&mut file).unwrap();
        assert_eq!(decoded, script);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = b"XXXX\x01\x00\x00\x00".to_vec();
        assert!(matches!(
            read(&mut Cursor::new(buf)),
            Err(CodecError::BadMagic)
        ));
    }

    #[test]
    fn rejects_unsupported_major_version() {
        let mut buf = MAGIC.to_vec();
        let wrong_major = 99u32 << 16;
        buf.extend_from_slice(&wrong_major.to_le_bytes());
        assert!(matches!(
            read(&mut Cursor::new(buf)),
            Err(CodecError::UnsupportedVersion { found }) if found == wrong_major
        ));
    }

    #[test]
    fn accepts_same_major_with_different_minor_patch() {
        let script = sample_script();
        let mut buf = Vec::new();
        write(&script, &mut buf).unwrap();

        // Bump minor/patch in place; major stays the same.
        let version_bytes: [u8; 4] = [buf[4], buf[5], buf[6], buf[7]];
        let mut version = u32::from_le_bytes(version_bytes);
        version = (version & 0xFFFF_0000) | 0x0000_0203; // minor 2, patch 3
        buf[4..8].copy_from_slice(&version.to_le_bytes());

        let decoded = read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, script);
    }

    #[test]
    fn rejects_truncated_input() {
        let script = sample_script();
        let mut buf = Vec::new();
        write(&script, &mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            read(&mut Cursor::new(buf)),
            Err(CodecError::Truncated)
        ));
    }
}
