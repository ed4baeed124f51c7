// SPDX-License-Identifier: CEPL-1.0
use ash::util::read_spv;
use std::io::Cursor;
use std::path::Path;
use tracing::info;

use crate::error::VkError;

const BUILTIN_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/quad.vert.spv"));
const BUILTIN_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/quad.frag.spv"));

/// Vertex + fragment SPIR-V as 32-bit words. The contents are handed to the
/// driver untouched.
#[derive(Clone, Debug)]
pub struct ShaderSet {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderSet {
    pub fn from_bytes(vertex: &[u8], fragment: &[u8]) -> Result<Self, VkError> {
        Ok(Self {
            vertex: read_spv(&mut Cursor::new(vertex))?,
            fragment: read_spv(&mut Cursor::new(fragment))?,
        })
    }

    /// Shaders compiled by the build script.
    pub fn builtin() -> Result<Self, VkError> {
        Self::from_bytes(BUILTIN_VERT, BUILTIN_FRAG)
    }

    /// Reads `vert.spv` and `frag.spv` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, VkError> {
        let vertex = std::fs::read(dir.join("vert.spv"))?;
        let fragment = std::fs::read(dir.join("frag.spv"))?;
        info!("shaders: loaded from {}", dir.display());
        Self::from_bytes(&vertex, &fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_shaders_are_spirv() {
        let set = ShaderSet::builtin().unwrap();
        assert_eq!(set.vertex[0], 0x0723_0203);
        assert_eq!(set.fragment[0], 0x0723_0203);
    }

    #[test]
    fn truncated_bytecode_is_an_error() {
        let err = ShaderSet::from_bytes(&[0x03, 0x02, 0x23], BUILTIN_FRAG).unwrap_err();
        assert!(matches!(err, VkError::Shader(_)));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = ShaderSet::from_dir(Path::new("definitely/not/a/shader/dir")).unwrap_err();
        assert!(matches!(err, VkError::Shader(_)));
    }
}
