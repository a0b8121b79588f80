use crate::guard::GuardStyle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The source language an editor instance edits. Fixed for the lifetime of a
/// session; selects the mode compiler, the guard style and the persisted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Plain HTML/CSS/JS markup.
    Plain,
    /// Single-file component source handed to an external compiler.
    Component,
    /// Markup rendered with the utility-CSS runtime loaded.
    Utility,
    /// Fragment shader source.
    Shader,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [
        Dialect::Plain,
        Dialect::Component,
        Dialect::Utility,
        Dialect::Shader,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Component => "component",
            Self::Utility => "utility",
            Self::Shader => "shader",
        }
    }

    /// Key under which the last edited text of this dialect is persisted.
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Plain => "realtimehtml_code",
            Self::Component => "svelte_editor_code",
            Self::Utility => "tailwindcss_editor_code",
            Self::Shader => "glsl_editor_code",
        }
    }

    /// How loop headers are rewritten, or `None` when the dialect is never
    /// instrumented.
    pub fn guard_style(self) -> Option<GuardStyle> {
        match self {
            Self::Plain | Self::Component => Some(GuardStyle::Clause),
            Self::Utility => Some(GuardStyle::Sequence),
            Self::Shader => None,
        }
    }

    /// Boilerplate shown when nothing was shared or persisted.
    pub fn default_source(self) -> &'static str {
        match self {
            Self::Plain => DEFAULT_PLAIN,
            Self::Component => DEFAULT_COMPONENT,
            Self::Utility => DEFAULT_UTILITY,
            Self::Shader => DEFAULT_SHADER,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "html" => Ok(Self::Plain),
            "component" | "svelte" => Ok(Self::Component),
            "utility" | "tailwind" => Ok(Self::Utility),
            "shader" | "glsl" => Ok(Self::Shader),
            other => Err(format!(
                "unknown dialect: {other} (expected plain, component, utility or shader)"
            )),
        }
    }
}

const DEFAULT_PLAIN: &str = r#"<html>
 <head></head>
<body>

    <div id="message"></div>

    <script>
       document.getElementById('message').innerHTML = 'Edit code left, see the result right';
    </script>

</body>
</html>"#;

const DEFAULT_UTILITY: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <script src="https://cdn.tailwindcss.com"></script>
</head>
<body class="bg-gray-50 min-h-screen flex items-center justify-center p-4">
    <div class="max-w-sm w-full bg-white rounded-lg shadow-md hover:shadow-lg transition-shadow">
        <div class="p-4 border-b flex items-center justify-between">
            <span class="text-xl">Welcome!</span>
            <span class="text-gray-400 hover:text-gray-600 cursor-pointer">&times;</span>
        </div>
        <div class="p-4">
            <p class="text-gray-600">Start editing to see the magic happen</p>
            <button class="mt-3 block w-full bg-blue-500 text-white text-center
                           py-2 rounded-md hover:bg-blue-600">
                Get Started
            </button>
        </div>
    </div>
</body>
</html>"#;

const DEFAULT_COMPONENT: &str = r#"<script>
    let count = 0;
    let name = 'counter';
</script>

<main>
    <div>
        <h2 class="text-3xl pb-3" >Count is {count}</h2>
        <button class='bg-black p-3 rounded text-white '
                on:click={() => count += 1}>
            Increment {name}
        </button>
    </div>
</main>

<style>
    main {
        text-align: center;
        margin-top: 45%;
    }

    button:hover {
        background: #ff5722;
    }
</style>"#;

const DEFAULT_SHADER: &str = r#"#version 300 es
precision highp float;

uniform float iTime;
uniform vec3 iResolution;
uniform vec4 iMouse;

out vec4 fragColor;

void main() {
    vec2 uv = gl_FragCoord.xy / iResolution.xy;
    vec3 col = 0.5 + 0.5 * cos(iTime + uv.xyx + vec3(0.0, 2.0, 4.0));
    fragColor = vec4(col, 1.0);
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("html".parse::<Dialect>(), Ok(Dialect::Plain));
        assert_eq!("Svelte".parse::<Dialect>(), Ok(Dialect::Component));
        assert_eq!("tailwind".parse::<Dialect>(), Ok(Dialect::Utility));
        assert_eq!(" glsl ".parse::<Dialect>(), Ok(Dialect::Shader));
        assert!("cobol".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_display_roundtrips_through_from_str() {
        for dialect in Dialect::ALL {
            assert_eq!(dialect.to_string().parse::<Dialect>(), Ok(dialect));
        }
    }

    #[test]
    fn test_storage_keys_are_distinct() {
        let mut keys: Vec<_> = Dialect::ALL.iter().map(|d| d.storage_key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), Dialect::ALL.len());
    }

    #[test]
    fn test_shader_is_never_guarded() {
        assert_eq!(Dialect::Shader.guard_style(), None);
        assert_eq!(Dialect::Utility.guard_style(), Some(GuardStyle::Sequence));
        assert_eq!(Dialect::Plain.guard_style(), Some(GuardStyle::Clause));
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Dialect::Utility).unwrap();
        assert_eq!(json, "\"utility\"");
        let back: Dialect = serde_json::from_str("\"shader\"").unwrap();
        assert_eq!(back, Dialect::Shader);
    }
}
