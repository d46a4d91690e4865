//! BIP-32 style derivation paths addressing a key inside a hardware device

use crate::error::{AirgapError, AirgapResult};

use std::fmt;
use std::str::FromStr;

/// Bit marking a hardened component
pub const HARDENED_BIT: u32 = 0x8000_0000;

/// Deepest path a device accepts
pub const MAX_DEPTH: usize = 10;

/// Single component of a derivation path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathComponent {
    pub index: u32,
    pub hardened: bool,
}

impl PathComponent {
    pub fn normal(index: u32) -> Self {
        Self {
            index,
            hardened: false,
        }
    }

    pub fn hardened(index: u32) -> Self {
        Self {
            index,
            hardened: true,
        }
    }

    /// The 32-bit word sent to the device
    pub fn encoded(&self) -> u32 {
        if self.hardened {
            self.index | HARDENED_BIT
        } else {
            self.index
        }
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hardened {
            write!(f, "{}'", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// Ordered list of path components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath {
    components: Vec<PathComponent>,
}

impl DerivationPath {
    pub fn new(components: Vec<PathComponent>) -> AirgapResult<Self> {
        if components.is_empty() {
            return Err(AirgapError::Validation(
                "derivation path has no components".to_string(),
            ));
        }
        if components.len() > MAX_DEPTH {
            return Err(AirgapError::Validation(format!(
                "derivation path has {} components, limit is {}",
                components.len(),
                MAX_DEPTH
            )));
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.components
    }

    /// Component count byte followed by 4-byte big-endian words
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 4 * self.components.len());
        out.push(self.components.len() as u8);
        for component in &self.components {
            out.extend_from_slice(&component.encoded().to_be_bytes());
        }
        out
    }

    /// Heuristic used to tell a path from an address on the command line
    pub fn looks_like_path(input: &str) -> bool {
        let input = input.trim();
        !input.starts_with("0x") && input.contains('/')
    }
}

fn parse_component(part: &str) -> AirgapResult<PathComponent> {
    let (digits, hardened) = match part
        .strip_suffix('\'')
        .or_else(|| part.strip_suffix('h'))
        .or_else(|| part.strip_suffix('H'))
    {
        Some(digits) => (digits, true),
        None => (part, false),
    };

    let index: u32 = digits.parse().map_err(|_| {
        AirgapError::Validation(format!("invalid derivation path component '{}'", part))
    })?;
    if index & HARDENED_BIT != 0 {
        return Err(AirgapError::Validation(format!(
            "derivation index {} is out of range",
            index
        )));
    }

    Ok(PathComponent { index, hardened })
}

impl FromStr for DerivationPath {
    type Err = AirgapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix("m/")
            .or_else(|| s.strip_prefix("M/"))
            .unwrap_or(s);

        let components = s
            .split('/')
            .map(parse_component)
            .collect::<AirgapResult<Vec<_>>>()?;

        Self::new(components)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}
