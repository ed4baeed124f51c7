use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    // Vertex shader: matches the Rust-side Vertex layout and UniformBlock.
    //   - binding 0, location 0: R32G32_SFLOAT (position)
    //   - binding 0, location 1: R32G32B32_SFLOAT (color)
    //   - binding 0, location 2: R32G32_SFLOAT (tex coord)
    //   - set 0, binding 0: model/view/proj
    let vs_src = r#"
#version 450
layout(set = 0, binding = 0) uniform UniformBlock {
    mat4 model;
    mat4 view;
    mat4 proj;
} ubo;

layout(location = 0) in vec2 inPosition;
layout(location = 1) in vec3 inColor;
layout(location = 2) in vec2 inTexCoord;

layout(location = 0) out vec3 fragColor;
layout(location = 1) out vec2 fragTexCoord;

void main() {
    gl_Position = ubo.proj * ubo.view * ubo.model * vec4(inPosition, 0.0, 1.0);
    fragColor = inColor;
    fragTexCoord = inTexCoord;
}
"#;

    // Fragment shader: texture tinted by the interpolated vertex color.
    let fs_src = r#"
#version 450
layout(set = 0, binding = 1) uniform sampler2D texSampler;

layout(location = 0) in vec3 fragColor;
layout(location = 1) in vec2 fragTexCoord;

layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(fragColor, 1.0) * texture(texSampler, fragTexCoord);
}
"#;

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");

    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let vs_spv = comp
        .compile_into_spirv(
            vs_src,
            shaderc::ShaderKind::Vertex,
            "quad.vert",
            "main",
            Some(&opts),
        )
        .expect("compile quad.vert");

    let fs_spv = comp
        .compile_into_spirv(
            fs_src,
            shaderc::ShaderKind::Fragment,
            "quad.frag",
            "main",
            Some(&opts),
        )
        .expect("compile quad.frag");

    fs::write(out.join("quad.vert.spv"), vs_spv.as_binary_u8()).expect("write quad.vert.spv");
    fs::write(out.join("quad.frag.spv"), fs_spv.as_binary_u8()).expect("write quad.frag.spv");

    println!("cargo:rerun-if-changed=build.rs");
}
