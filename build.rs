// Compiles the GLSL shader sources under shaders/ to SPIR-V with glslc.
//
// Shader compilation failures are reported as cargo warnings rather than
// build errors: the binary loads the .spv files at runtime and reports a
// missing or stale one through its own error path, and a checkout without
// the Vulkan SDK should still build.

use std::process::Command;

const STAGES: &[(&str, &str)] = &[
    ("shaders/triangle.vert", "shaders/triangle.vert.spv"),
    ("shaders/triangle.frag", "shaders/triangle.frag.spv"),
];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    for &(source, spirv) in STAGES {
        match Command::new("glslc").args([source, "-o", spirv]).status() {
            Ok(status) if status.success() => {
                println!("Compiled {source} -> {spirv}");
            }
            Ok(status) => {
                println!(
                    "cargo:warning=glslc failed on {source} (exit {:?}); \
                     keeping the previous {spirv} if one exists",
                    status.code()
                );
            }
            Err(e) => {
                println!("cargo:warning=glslc not found ({e}); skipping shader compilation");
                println!("cargo:warning=install the Vulkan SDK or run: glslc {source} -o {spirv}");
            }
        }
    }
}
