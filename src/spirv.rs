//! Structural checks on SPIR-V modules.

pub mod precompiled;

use std::io::Cursor;

use crate::error::{Error, Result};

/// First word of every SPIR-V module.
pub const MAGIC: u32 = 0x0723_0203;

const HEADER_WORDS: usize = 5;

/// A SPIR-V module whose header and instruction stream have been checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spirv {
    name: String,
    words: Vec<u32>,
}

fn validate(words: &[u32]) -> std::result::Result<(), String> {
    if words.len() < HEADER_WORDS {
        return Err(format!(
            "module is {} words long, shorter than the header",
            words.len()
        ));
    }

    if words[0] != MAGIC {
        return Err(format!(
            "bad magic number {:#010x} (expected {:#010x})",
            words[0], MAGIC
        ));
    }

    let major = (words[1] >> 16) & 0xff;
    if major != 1 {
        return Err(format!("unsupported SPIR-V version word {:#010x}", words[1]));
    }

    if words[3] == 0 {
        return Err("id bound is zero".into());
    }

    let mut at = HEADER_WORDS;
    while at < words.len() {
        let word_count = (words[at] >> 16) as usize;
        if word_count == 0 {
            return Err(format!("instruction at word {} has zero length", at));
        }
        if at + word_count > words.len() {
            return Err(format!(
                "instruction at word {} runs past the end of the module",
                at
            ));
        }
        at += word_count;
    }

    Ok(())
}

impl Spirv {
    pub fn from_words<S: Into<String>>(name: S, words: Vec<u32>) -> Result<Spirv> {
        let name = name.into();
        match validate(&words) {
            Ok(()) => Ok(Spirv { name, words }),
            Err(reason) => {
                log::error!("invalid SPIR-V in {}: {}", name, reason);
                Err(Error::InvalidSpirv { name, reason })
            }
        }
    }

    /// Loads a module from bytes in either byte order.
    pub fn from_bytes<S: Into<String>>(name: S, bytes: &[u8]) -> Result<Spirv> {
        let name = name.into();
        match ash::util::read_spv(&mut Cursor::new(bytes)) {
            Ok(words) => Spirv::from_words(name, words),
            Err(e) => {
                log::error!("failed to read SPIR-V {}: {}", name, e);
                Err(Error::InvalidSpirv {
                    name,
                    reason: e.to_string(),
                })
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Vec<u32> {
        // Header plus `OpCapability Shader`.
        vec![MAGIC, 0x0001_0000, 0, 1, 0, 0x0002_0011, 1]
    }

    fn reason(err: Error) -> String {
        match err {
            Error::InvalidSpirv { reason, .. } => reason,
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn precompiled_modules_are_well_formed() {
        let modules = [
            ("triangle.vert", precompiled::TRIANGLE_VERT),
            ("triangle.frag", precompiled::TRIANGLE_FRAG),
            ("fullscreen.vert", precompiled::FULLSCREEN_VERT),
            ("gradient.frag", precompiled::GRADIENT_FRAG),
        ];

        for (name, words) in modules {
            let spirv = Spirv::from_words(name, words.to_vec()).unwrap();
            assert_eq!(spirv.words()[0], MAGIC);
            // Nonzero id bound.
            assert!(spirv.words()[3] > 1, "{}", name);
            // Every module ends with OpFunctionEnd.
            assert_eq!(*spirv.words().last().unwrap(), 0x0001_0038, "{}", name);
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let mut words = minimal();
        words[0] = 0xdead_beef;
        let err = Spirv::from_words("bad", words).unwrap_err();
        assert!(reason(err).contains("magic"));
    }

    #[test]
    fn rejects_short_header() {
        let err = Spirv::from_words("short", vec![MAGIC, 0x0001_0000]).unwrap_err();
        assert!(reason(err).contains("header"));
    }

    #[test]
    fn rejects_overrunning_instruction() {
        let mut words = minimal();
        words[5] = 0x0005_0011;
        let err = Spirv::from_words("overrun", words).unwrap_err();
        assert!(reason(err).contains("past the end"));
    }

    #[test]
    fn rejects_zero_length_instruction() {
        let mut words = minimal();
        words[5] = 0x0000_0011;
        let err = Spirv::from_words("zero", words).unwrap_err();
        assert!(reason(err).contains("zero length"));
    }

    #[test]
    fn bytes_in_either_order() {
        let words = minimal();
        let le: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let be: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();

        assert_eq!(Spirv::from_bytes("le", &le).unwrap().words(), words.as_slice());
        assert_eq!(Spirv::from_bytes("be", &be).unwrap().words(), words.as_slice());
        assert!(Spirv::from_bytes("odd", &le[..7]).is_err());
    }
}
