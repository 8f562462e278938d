use std::fmt;
use std::str::FromStr;

/// WASM size/speed tradeoff, selecting the client toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
pub enum WasmMode {
    /// Standard Go toolchain.
    #[default]
    Large,
    /// TinyGo, balanced optimization.
    Medium,
    /// TinyGo, size-optimized, no debug info.
    Small,
}

impl WasmMode {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Large => "L",
            Self::Medium => "M",
            Self::Small => "S",
        }
    }

    /// Large builds with `go`, the others with `tinygo`.
    pub const fn uses_tinygo(self) -> bool {
        !matches!(self, Self::Large)
    }
}

impl fmt::Display for WasmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for WasmMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "large" => Ok(Self::Large),
            "m" | "medium" => Ok(Self::Medium),
            "s" | "small" => Ok(Self::Small),
            other => Err(format!("unknown wasm mode `{other}` (expected L, M or S)")),
        }
    }
}

/// Where the WASM artifact goes after a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputTarget {
    #[default]
    Disk,
    Memory,
}

impl OutputTarget {
    pub const fn from_on_disk(on_disk: bool) -> Self {
        if on_disk { Self::Disk } else { Self::Memory }
    }

    pub const fn is_disk(self) -> bool {
        matches!(self, Self::Disk)
    }

    pub const fn toggled(self) -> Self {
        match self {
            Self::Disk => Self::Memory,
            Self::Memory => Self::Disk,
        }
    }
}

/// Who answers HTTP on the app port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Built-in static file server.
    Internal,
    /// User server binary, compiled and supervised.
    External,
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => f.write_str("internal"),
            Self::External => f.write_str("external"),
        }
    }
}

impl FromStr for ServerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" | "int" | "static" => Ok(Self::Internal),
            "external" | "ext" => Ok(Self::External),
            other => Err(format!(
                "unknown server mode `{other}` (expected internal or external)"
            )),
        }
    }
}
