use crate::artifact::{CompiledArtifact, HeadFragment, ScriptBlock};
use crate::assemble::assemble;
use crate::cdn::CdnConfig;
use crate::guard::DISABLE_MARKERS;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const VERTEX_SHADER: &str =
    "in vec3 position;\nvoid main() {\n    gl_Position = vec4(position, 1.0);\n}";

const MAIN_IMAGE_PREAMBLE: &str = "precision highp float;

uniform vec3 iResolution;
uniform float iTime;
uniform float iTimeDelta;
uniform float iFrameRate;
uniform int iFrame;
uniform float iChannelTime[4];
uniform vec3 iChannelResolution[4];
uniform vec4 iMouse;
uniform vec4 iDate;

out vec4 livepadFragColor;

";

const MAIN_IMAGE_ADAPTER: &str = "

void main() {
    mainImage(livepadFragColor, gl_FragCoord.xy);
}
";

const MARGIN_RESET: &str = "body { margin: 0; overflow: hidden; }\ncanvas { display: block; }";

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("shader cleanup pattern is valid")
}

/// Normalises fragment shader text for the rendering engine, which supplies
/// its own `#version` line: the directive and any loop-guard artifacts are
/// removed and runs of blank lines collapse to one.
pub fn clean_shader_source(source: &str) -> String {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    static GUARD: OnceLock<Regex> = OnceLock::new();
    static BLANKS: OnceLock<Regex> = OnceLock::new();

    let version = VERSION.get_or_init(|| regex(r"(?m)^[ \t]*#version[^\n]*\n?"));
    let guard = GUARD.get_or_init(|| regex(r"__loopGuard\(\d+\)(?:\s*(?:&&|,)\s*)?"));
    let blanks = BLANKS.get_or_init(|| regex(r"\n(?:[ \t]*\n){2,}"));

    let text = version.replace_all(source, "");
    let text = guard.replace_all(&text, "");
    let text = blanks.replace_all(&text, "\n\n");

    if defines_main_image(&text) {
        format!("{MAIN_IMAGE_PREAMBLE}{}{MAIN_IMAGE_ADAPTER}", text.trim_end())
    } else {
        text.into_owned()
    }
}

/// Image-style shaders define `mainImage(out vec4, in vec2)` and no entry point.
fn defines_main_image(text: &str) -> bool {
    static MAIN_IMAGE: OnceLock<Regex> = OnceLock::new();
    static MAIN: OnceLock<Regex> = OnceLock::new();
    let main_image = MAIN_IMAGE.get_or_init(|| regex(r"\bvoid\s+mainImage\s*\("));
    let main = MAIN.get_or_init(|| regex(r"\bvoid\s+main\s*\("));
    main_image.is_match(text) && !main.is_match(text)
}

pub(super) fn compile(source: &str, cdn: &CdnConfig) -> CompiledArtifact {
    let mut imports = BTreeMap::new();
    imports.insert("three".to_string(), cdn.render_engine.clone());
    imports.insert("three/addons/".to_string(), cdn.render_addons.clone());

    CompiledArtifact {
        head: vec![HeadFragment::Style(MARGIN_RESET.to_string())],
        body: String::new(),
        scripts: vec![
            ScriptBlock::External {
                src: cdn.render_shim.clone(),
                is_async: true,
                module: false,
            },
            ScriptBlock::ImportMap(imports),
            ScriptBlock::Inline {
                code: bootstrap(&clean_shader_source(source)),
                module: true,
            },
        ],
    }
}

/// A self-contained page running `source` outside the editor. It carries the
/// loop-guard opt-out marker so pasting it back into a markup editor runs it
/// unmodified.
pub fn render_shader_export(source: &str, cdn: &CdnConfig) -> String {
    let mut artifact = compile(source, cdn);
    artifact.head.splice(
        0..0,
        [
            HeadFragment::Raw("<title>Three.js Shader Example</title>".to_string()),
            HeadFragment::Raw(DISABLE_MARKERS[0].to_string()),
        ],
    );
    assemble(&artifact, None)
}

fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

fn bootstrap(fragment: &str) -> String {
    let mut code = String::new();
    code.push_str("import * as THREE from 'three';\n\n");
    code.push_str(&format!("const vertexShader = {};\n", js_string(VERTEX_SHADER)));
    code.push_str(&format!("const fragmentShader = {};\n", js_string(fragment)));
    code.push_str(SCENE_JS);
    code
}

const SCENE_JS: &str = r#"
const scene = new THREE.Scene();
const camera = new THREE.OrthographicCamera(-1, 1, 1, -1, 0, 1);
const renderer = new THREE.WebGLRenderer({ antialias: true });
renderer.setSize(window.innerWidth, window.innerHeight);
document.body.appendChild(renderer.domElement);

window.addEventListener('resize', () => {
    renderer.setSize(window.innerWidth, window.innerHeight);
});

const uniforms = {
    iTime: { value: 0 },
    iResolution: { value: new THREE.Vector3(window.innerWidth, window.innerHeight, 1) },
    iMouse: { value: new THREE.Vector4() },
    iFrame: { value: 0 },
    iTimeDelta: { value: 0 },
    iFrameRate: { value: 60 },
    iChannelTime: { value: [0, 0, 0, 0] },
    iChannelResolution: { value: [
        new THREE.Vector3(0, 0, 0),
        new THREE.Vector3(0, 0, 0),
        new THREE.Vector3(0, 0, 0),
        new THREE.Vector3(0, 0, 0)
    ]},
    iDate: { value: new THREE.Vector4() }
};

const material = new THREE.RawShaderMaterial({
    vertexShader,
    fragmentShader,
    uniforms,
    glslVersion: THREE.GLSL3
});

scene.add(new THREE.Mesh(new THREE.PlaneGeometry(2, 2), material));

const mouse = { x: 0, y: 0, z: 0, w: 0 };
let mouseDown = false;

renderer.domElement.addEventListener('pointermove', (e) => {
    mouse.x = e.clientX;
    mouse.y = window.innerHeight - e.clientY;
    if (mouseDown) {
        mouse.z = mouse.x;
        mouse.w = mouse.y;
    }
    uniforms.iMouse.value.set(mouse.x, mouse.y, mouse.z, mouse.w);
});

renderer.domElement.addEventListener('pointerdown', (e) => {
    mouseDown = true;
    mouse.z = e.clientX;
    mouse.w = window.innerHeight - e.clientY;
    uniforms.iMouse.value.set(mouse.x, mouse.y, mouse.z, mouse.w);
});

renderer.domElement.addEventListener('pointerup', () => {
    mouseDown = false;
});

const startTime = performance.now();
let lastTime = startTime;

function animate() {
    requestAnimationFrame(animate);

    const now = performance.now();
    const delta = (now - lastTime) * 0.001;
    lastTime = now;

    uniforms.iTime.value = (now - startTime) * 0.001;
    uniforms.iTimeDelta.value = delta;
    uniforms.iFrame.value++;
    uniforms.iFrameRate.value = delta > 0 ? 1.0 / delta : 60;
    uniforms.iResolution.value.set(window.innerWidth, window.innerHeight, 1);

    const date = new Date();
    uniforms.iDate.value.set(
        date.getFullYear(),
        date.getMonth(),
        date.getDate(),
        date.getHours() * 3600 + date.getMinutes() * 60 + date.getSeconds()
            + date.getMilliseconds() * 0.001
    );

    renderer.render(scene, camera);
}
animate();"#;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cleanup_strips_version_and_guard_artifacts() {
        let src = concat!(
            "#version 300 es\nprecision highp float;\nvoid main() {\n",
            "  for (int i = 0; i < 4; __loopGuard(4) && (i++)) {}\n",
            "  for (;;__loopGuard(5)) { break; }\n}",
        );
        assert_eq!(
            clean_shader_source(src),
            concat!(
                "precision highp float;\nvoid main() {\n",
                "  for (int i = 0; i < 4; (i++)) {}\n  for (;;) { break; }\n}",
            )
        );
    }

    #[test]
    fn test_cleanup_keeps_true_literals() {
        let src = "bool on = true;\nvoid main() { if (on == true) {} }";
        assert_eq!(clean_shader_source(src), src);
    }

    #[test]
    fn test_cleanup_collapses_blank_runs() {
        assert_eq!(clean_shader_source("a;\n\n\n\n  \nb;\n\nc;"), "a;\n\nb;\n\nc;");
    }

    #[test]
    fn test_main_image_gets_adapter() {
        let out = clean_shader_source(concat!(
            "void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n",
            "    fragColor = vec4(1.0);\n}\n",
        ));
        assert!(out.starts_with("precision highp float;"));
        assert!(out.contains("uniform vec3 iResolution;"));
        assert!(
            out.ends_with("void main() {\n    mainImage(livepadFragColor, gl_FragCoord.xy);\n}\n")
        );
    }

    #[test]
    fn test_shader_with_main_is_not_wrapped() {
        let src = "void mainImage(out vec4 c, in vec2 p) {}\nvoid main() {}";
        assert_eq!(clean_shader_source(src), src);
    }

    #[test]
    fn test_compile_embeds_source_as_string_literal() {
        let artifact = compile("void main() { /* \"quoted\" `tick` */ }", &CdnConfig::default());
        let ScriptBlock::Inline { code, module } = &artifact.scripts[2] else {
            panic!("expected inline bootstrap");
        };
        assert!(*module);
        assert!(code.contains(
            r#"const fragmentShader = "void main() { /* \"quoted\" `tick` */ }";"#
        ));
        let uniforms = [
            "iTime",
            "iTimeDelta",
            "iResolution",
            "iMouse",
            "iFrame",
            "iFrameRate",
            "iChannelTime",
            "iChannelResolution",
            "iDate",
        ];
        for uniform in uniforms {
            assert!(code.contains(&format!("{uniform}: {{")), "missing {uniform}");
        }
        assert!(code.contains("glslVersion: THREE.GLSL3"));
        assert!(code.contains("requestAnimationFrame(animate)"));
        assert!(artifact.body.is_empty());
    }

    #[test]
    fn test_export_is_standalone_and_opted_out() {
        let page = render_shader_export("#version 300 es\nvoid main() {}", &CdnConfig::default());
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<!-- disable-loop-protection -->"));
        assert!(page.contains("<title>Three.js Shader Example</title>"));
        assert!(page.contains("three@0.160.0/build/three.module.js"));
        assert!(!page.contains("#version"));
        assert!(!page.contains("window.__loopGuard"));
    }
}
