// renderer/shaders.rs
//! Built-in WGSL programs. Every stage is compiled as its own module with the
//! shared declarations prepended; entry points are `vs_main` and `fs_main`.

use crate::renderer::context::ProgramDescriptor;

const COMMON: &str = include_str!("../shader/common.wgsl");
const BASIC: &str = include_str!("../shader/basic.wgsl");
const TINTED: &str = include_str!("../shader/tinted.wgsl");
const TEXTURED: &str = include_str!("../shader/textured.wgsl");
const LIT: &str = include_str!("../shader/lit.wgsl");
const FULLSCREEN: &str = include_str!("../shader/fullscreen.wgsl");
const VIGNETTE: &str = include_str!("../shader/postprocess/vignette.wgsl");
const DISTORTION: &str = include_str!("../shader/postprocess/distortion.wgsl");

/// Prefix naming a built-in composite stage instead of a file.
pub const BUILTIN_PREFIX: &str = "builtin:";

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

pub fn with_common(source: &str) -> String {
    format!("{}\n{}", COMMON, source)
}

fn program(label: &str, vertex: &str, fragment: &str) -> ProgramDescriptor {
    ProgramDescriptor {
        label: label.to_string(),
        vertex: with_common(vertex),
        fragment: with_common(fragment),
    }
}

/// Looks up a built-in program by the name scene files use.
pub fn builtin(name: &str) -> Option<ProgramDescriptor> {
    match name {
        "basic" => Some(program(name, BASIC, BASIC)),
        "tinted" => Some(program(name, BASIC, TINTED)),
        "textured" => Some(program(name, BASIC, TEXTURED)),
        "lit" => Some(program(name, LIT, LIT)),
        _ => None,
    }
}

pub fn textured() -> ProgramDescriptor {
    program("textured", BASIC, TEXTURED)
}

/// Full-screen triangle vertex stage paired with a composite fragment stage.
pub fn fullscreen(label: &str, fragment: &str) -> ProgramDescriptor {
    program(label, FULLSCREEN, fragment)
}

/// Built-in composite fragment stages, addressable as `builtin:<name>`.
pub fn builtin_postprocess(name: &str) -> Option<&'static str> {
    match name {
        "vignette" => Some(VIGNETTE),
        "distortion" => Some(DISTORTION),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_carry_common_declarations() {
        for name in ["basic", "tinted", "textured", "lit"] {
            let desc = builtin(name).unwrap();
            assert!(desc.vertex.contains("struct DrawUniforms"));
            assert!(desc.vertex.contains(VERTEX_ENTRY));
            assert!(desc.fragment.contains(FRAGMENT_ENTRY));
        }
        assert!(builtin("pbr").is_none());
    }

    #[test]
    fn fullscreen_has_no_vertex_inputs() {
        let desc = fullscreen("composite", VIGNETTE);
        assert!(desc.vertex.contains("@builtin(vertex_index)"));
        assert!(builtin_postprocess("distortion").is_some());
    }
}
