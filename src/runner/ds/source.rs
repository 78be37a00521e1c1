//! Script sources and per-compilation options.

/// Immutable script input with diagnostic coordinates.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub text: String,
    pub path: String,
    /// Line number reported for the first line of `text`.
    pub base_line: u32,
}

impl ScriptSource {
    pub fn new(text: impl Into<String>) -> Self {
        ScriptSource {
            text: text.into(),
            path: "unnamed".to_string(),
            base_line: 1,
        }
    }

    pub fn with_path(text: impl Into<String>, path: impl Into<String>) -> Self {
        ScriptSource {
            text: text.into(),
            path: path.into(),
            base_line: 1,
        }
    }

    /// 1-based line of a byte offset, shifted by `base_line`.
    pub fn line_of_offset(&self, offset: usize) -> u32 {
        let clamped = offset.min(self.text.len());
        let newlines = self.text[..clamped].bytes().filter(|b| *b == b'\n').count();
        self.base_line + newlines as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityMode {
    Latest,
    /// ES3-flavoured quirks: `NaN`, `Infinity` and `undefined` globals stay
    /// writable.
    Legacy,
}

/// Options cloned into each compilation unit.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub force_strict_mode: bool,
    pub compatibility_mode: CompatibilityMode,
    /// Keep a disassembly listing on the compiled unit.
    pub emit_diagnostics: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            force_strict_mode: false,
            compatibility_mode: CompatibilityMode::Latest,
            emit_diagnostics: false,
        }
    }
}
