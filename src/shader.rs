//! Shader sources, compilation and shader modules.

use std::{borrow::Cow, fs, path::Path};

use ash::vk;

use crate::{
    device::Context,
    error::{check, Error, Result},
    spirv::Spirv,
    util::{drop_message, ErrorOnDrop},
};

pub const ENTRY_POINT: &str = "main";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

/// GLSL source for one shader stage.
#[derive(Copy, Clone, Debug)]
pub struct ShaderSource {
    /// File name looked up in the shader directory, also passed to the
    /// compiler for diagnostics.
    pub name: &'static str,
    pub stage: ShaderStage,
    /// Source used when the file is absent.
    pub embedded: &'static str,
    /// Module used when the compiler fails.
    pub precompiled: Option<&'static [u32]>,
}

impl ShaderSource {
    /// Returns the text of `dir/name` if it can be read, otherwise the
    /// embedded source.
    pub fn load_text(&self, dir: Option<&Path>) -> Cow<'static, str> {
        if let Some(dir) = dir {
            let path = dir.join(self.name);
            match fs::read_to_string(&path) {
                Ok(text) => {
                    log::debug!("loaded shader source {}", path.display());
                    return Cow::Owned(text);
                }
                Err(e) => {
                    log::debug!("using embedded {} ({}: {})", self.name, path.display(), e)
                }
            }
        }

        Cow::Borrowed(self.embedded)
    }

    /// Reads a prebuilt `dir/<name>.spv` module if one exists.
    pub fn load_binary(&self, dir: Option<&Path>) -> Option<Result<Spirv>> {
        let path = dir?.join(format!("{}.spv", self.name));
        let bytes = fs::read(&path).ok()?;
        log::debug!("loaded prebuilt module {}", path.display());
        Some(Spirv::from_bytes(self.name, &bytes))
    }
}

/// Turns shader source into SPIR-V words.
pub trait ShaderCompiler {
    fn compile(
        &self,
        source: &str,
        stage: ShaderStage,
        file_name: &str,
        entry_point: &str,
    ) -> std::result::Result<Vec<u32>, String>;
}

/// A compiler that always fails, leaving only precompiled modules.
#[derive(Copy, Clone, Debug, Default)]
pub struct UnavailableCompiler;

impl ShaderCompiler for UnavailableCompiler {
    fn compile(
        &self,
        _source: &str,
        _stage: ShaderStage,
        file_name: &str,
        _entry_point: &str,
    ) -> std::result::Result<Vec<u32>, String> {
        Err(format!(
            "{}: no runtime shader compiler (built without the `shaderc` feature)",
            file_name
        ))
    }
}

#[cfg(feature = "shaderc")]
pub struct ShadercCompiler {
    compiler: shaderc::Compiler,
}

#[cfg(feature = "shaderc")]
impl ShadercCompiler {
    pub fn new() -> Option<ShadercCompiler> {
        let compiler = shaderc::Compiler::new()?;
        Some(ShadercCompiler { compiler })
    }
}

#[cfg(feature = "shaderc")]
impl ShaderCompiler for ShadercCompiler {
    fn compile(
        &self,
        source: &str,
        stage: ShaderStage,
        file_name: &str,
        entry_point: &str,
    ) -> std::result::Result<Vec<u32>, String> {
        let kind = match stage {
            ShaderStage::Vertex => shaderc::ShaderKind::Vertex,
            ShaderStage::Fragment => shaderc::ShaderKind::Fragment,
            ShaderStage::Compute => shaderc::ShaderKind::Compute,
        };

        let mut options =
            shaderc::CompileOptions::new().ok_or("failed to create shaderc options")?;
        options.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_0 as u32,
        );

        let artifact = self
            .compiler
            .compile_into_spirv(source, kind, file_name, entry_point, Some(&options))
            .map_err(|e| e.to_string())?;

        if artifact.get_num_warnings() > 0 {
            log::warn!("{}: {}", file_name, artifact.get_warning_messages());
        }

        Ok(artifact.as_binary().to_vec())
    }
}

/// Returns the runtime compiler if one is built in and initializes.
pub fn default_compiler() -> Box<dyn ShaderCompiler> {
    #[cfg(feature = "shaderc")]
    {
        match ShadercCompiler::new() {
            Some(c) => return Box::new(c),
            None => log::warn!("shaderc failed to initialize"),
        }
    }

    Box::new(UnavailableCompiler)
}

/// Compiles `source`. If compilation fails, falls back to a prebuilt
/// `<name>.spv` in `dir`, then to the source's precompiled module.
pub fn acquire_spirv(
    compiler: &dyn ShaderCompiler,
    source: &ShaderSource,
    dir: Option<&Path>,
) -> Result<Spirv> {
    let text = source.load_text(dir);

    let diagnostic = match compiler.compile(&text, source.stage, source.name, ENTRY_POINT) {
        Ok(words) => {
            log::debug!("compiled {} ({} words)", source.name, words.len());
            return Spirv::from_words(source.name, words);
        }
        Err(diagnostic) => diagnostic,
    };

    if let Some(spirv) = source.load_binary(dir) {
        log::warn!(
            "using prebuilt {}.spv after compilation failed: {}",
            source.name,
            diagnostic
        );
        return spirv;
    }

    match source.precompiled {
        Some(words) => {
            log::warn!(
                "using precompiled {} after compilation failed: {}",
                source.name,
                diagnostic
            );
            Spirv::from_words(source.name, words.to_vec())
        }
        None => {
            log::error!("failed to compile shader {}: {}", source.name, diagnostic);
            Err(Error::ShaderCompile {
                name: source.name.to_owned(),
                diagnostic,
            })
        }
    }
}

pub struct ShaderModule {
    pub raw: vk::ShaderModule,
    pub stage: ShaderStage,
}

impl ShaderModule {
    pub fn create(ctx: &Context, spirv: &Spirv, stage: ShaderStage) -> Result<ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::default().code(spirv.words());

        let raw = check(
            unsafe { ctx.device().create_shader_module(&info, None) },
            "vkCreateShaderModule",
            Error::PipelineCreation,
        )?;
        log::debug!("created shader module {}", spirv.name());

        Ok(ShaderModule { raw, stage })
    }

    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.flags())
            .module(self.raw)
            .name(c"main")
    }
}

drop_message!(
    DroppedGraphicsShaders,
    "GraphicsShaders must be manually destroyed with .destroy_with()"
);

/// The vertex and fragment modules of a graphics pipeline.
///
/// The modules only need to live until the pipeline has been created.
pub struct GraphicsShaders {
    bomb: ErrorOnDrop<DroppedGraphicsShaders>,

    pub vertex: ShaderModule,
    pub fragment: ShaderModule,
}

impl GraphicsShaders {
    pub fn create(ctx: &Context, vertex: &Spirv, fragment: &Spirv) -> Result<GraphicsShaders> {
        let vertex = ShaderModule::create(ctx, vertex, ShaderStage::Vertex)?;
        let fragment = match ShaderModule::create(ctx, fragment, ShaderStage::Fragment) {
            Ok(f) => f,
            Err(e) => {
                unsafe { ctx.device().destroy_shader_module(vertex.raw, None) };
                return Err(e);
            }
        };

        Ok(GraphicsShaders {
            bomb: ErrorOnDrop::new(DroppedGraphicsShaders),
            vertex,
            fragment,
        })
    }

    pub fn stage_infos(&self) -> [vk::PipelineShaderStageCreateInfo<'static>; 2] {
        [self.vertex.stage_info(), self.fragment.stage_info()]
    }

    /// # Safety
    ///
    /// No pipeline creation using these modules may be in progress.
    pub unsafe fn destroy_with(self, device: &ash::Device) {
        let GraphicsShaders {
            mut bomb,
            vertex,
            fragment,
        } = self;

        bomb.disarm();

        for shader in [vertex, fragment] {
            unsafe {
                device.destroy_shader_module(shader.raw, None);
            }
        }
    }
}
