use std::{borrow::Cow, ffi::CString, io::Cursor, sync::Arc};

use ash::vk;
use forge_render::descriptor::ShaderStages;

use crate::{convert::VkInto, device::AshDevice, Error, Result};

/// Compiled SPIR-V of one shader stage.
#[derive(Clone, Debug)]
pub struct ShaderStageCode<'a> {
    pub stage: ShaderStages,
    pub code: Cow<'a, [u32]>,
    pub entry_point: Cow<'a, str>,
}

impl<'a> ShaderStageCode<'a> {
    pub fn new(stage: ShaderStages, code: impl Into<Cow<'a, [u32]>>) -> Self {
        Self {
            stage,
            code: code.into(),
            entry_point: Cow::Borrowed("main"),
        }
    }

    /// Reads SPIR-V from raw bytes, fixing alignment and endianness.
    pub fn from_bytes(stage: ShaderStages, bytes: &[u8]) -> Result<Self> {
        let words = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|_| Error::InvalidDesc("shader code is not valid SPIR-V"))?;
        Ok(Self::new(stage, words))
    }

    #[inline]
    pub fn with_entry_point(mut self, entry_point: impl Into<Cow<'a, str>>) -> Self {
        self.entry_point = entry_point.into();
        self
    }
}

/// Specialization constant applied to every stage.
#[derive(Clone, Debug)]
pub struct ShaderConstant<'a> {
    pub constant_id: u32,
    pub data: Cow<'a, [u8]>,
}

#[derive(Clone, Debug, Default)]
pub struct BinaryShaderDesc<'a> {
    pub name: Option<&'a str>,
    pub stages: Vec<ShaderStageCode<'a>>,
    pub constants: Vec<ShaderConstant<'a>>,
}

pub(crate) struct ShaderModule {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
    pub entry_point: CString,
}

/// Packs specialization constants into map entries and one data blob.
pub(crate) fn specialization_data(
    constants: &[ShaderConstant<'_>],
) -> (Vec<vk::SpecializationMapEntry>, Vec<u8>) {
    let mut entries = Vec::with_capacity(constants.len());
    let mut data = Vec::new();
    for constant in constants {
        entries.push(vk::SpecializationMapEntry {
            constant_id: constant.constant_id,
            offset: data.len() as u32,
            size: constant.data.len(),
        });
        data.extend_from_slice(&constant.data);
    }
    (entries, data)
}

/// Shader modules of all stages of one program.
pub struct Shader {
    device: Arc<AshDevice>,
    modules: Vec<ShaderModule>,
    stages: ShaderStages,
    spec_entries: Vec<vk::SpecializationMapEntry>,
    spec_data: Vec<u8>,
}

impl Shader {
    pub(crate) fn new(device: &Arc<AshDevice>, desc: &BinaryShaderDesc<'_>) -> Result<Self> {
        if desc.stages.is_empty() {
            return Err(Error::InvalidDesc("shader without stages"));
        }
        let (spec_entries, spec_data) = specialization_data(&desc.constants);
        let mut shader = Self {
            device: device.clone(),
            modules: Vec::with_capacity(desc.stages.len()),
            stages: ShaderStages::empty(),
            spec_entries,
            spec_data,
        };
        for stage in &desc.stages {
            if stage.stage.bits().count_ones() != 1 {
                return Err(Error::InvalidDesc("every shader stage needs exactly one stage bit"));
            }
            let entry_point = CString::new(stage.entry_point.as_ref())
                .map_err(|_| Error::InvalidDesc("entry point contains a NUL byte"))?;
            let create_info = vk::ShaderModuleCreateInfo::builder().code(&stage.code);
            let module = unsafe { device.create::<vk::ShaderModule>(&create_info)? };
            if let Some(name) = desc.name {
                unsafe { device.object_name(module.raw(), name) };
            }
            shader.modules.push(ShaderModule {
                stage: stage.stage.vk_into(),
                module: module.take(),
                entry_point,
            });
            shader.stages |= stage.stage;
        }
        Ok(shader)
    }

    #[inline]
    pub fn stages(&self) -> ShaderStages {
        self.stages
    }

    #[inline]
    pub(crate) fn modules(&self) -> &[ShaderModule] {
        &self.modules
    }

    /// Specialization info shared by all stages, if any constants were given.
    pub(crate) fn specialization_info(&self) -> Option<vk::SpecializationInfo> {
        if self.spec_entries.is_empty() {
            return None;
        }
        Some(
            vk::SpecializationInfo::builder()
                .map_entries(&self.spec_entries)
                .data(&self.spec_data)
                .build(),
        )
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        for module in self.modules.drain(..) {
            unsafe { self.device.destroy(module.module) };
        }
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("stages", &self.stages)
            .field("modules", &self.modules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialization_data_is_packed() {
        let constants = [
            ShaderConstant {
                constant_id: 3,
                data: Cow::Borrowed(&[1, 0, 0, 0]),
            },
            ShaderConstant {
                constant_id: 7,
                data: Cow::Borrowed(&[2, 0]),
            },
        ];
        let (entries, data) = specialization_data(&constants);
        assert_eq!(2, entries.len());
        assert_eq!(7, entries[1].constant_id);
        assert_eq!(4, entries[1].offset);
        assert_eq!(2, entries[1].size);
        assert_eq!(vec![1, 0, 0, 0, 2, 0], data);
    }

    #[test]
    fn test_spirv_from_bytes() {
        // SPIR-V magic number followed by one word
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        let code = ShaderStageCode::from_bytes(ShaderStages::VERTEX, &bytes).unwrap();
        assert_eq!(&[0x0723_0203, 0x0001_0000][..], &code.code[..]);
        assert!(ShaderStageCode::from_bytes(ShaderStages::VERTEX, &bytes[..6]).is_err());
    }
}
