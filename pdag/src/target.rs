// target.rs — Machine description consumed by the graph builder
//
// Only the SIMD register width matters here: it turns a stage's narrowest
// element type into a vectorization hint.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub vector_bits: u32,
}

impl Target {
    pub const SSE: Target = Target { vector_bits: 128 };
    pub const NEON: Target = Target { vector_bits: 128 };
    pub const AVX2: Target = Target { vector_bits: 256 };
    pub const AVX512: Target = Target { vector_bits: 512 };

    pub fn new(vector_bits: u32) -> Self {
        Target { vector_bits }
    }

    /// Named preset: `sse`, `neon`, `avx2` or `avx512`.
    pub fn from_name(name: &str) -> Option<Target> {
        match name {
            "sse" => Some(Target::SSE),
            "neon" => Some(Target::NEON),
            "avx2" => Some(Target::AVX2),
            "avx512" => Some(Target::AVX512),
            _ => None,
        }
    }

    /// Lanes of `t` that fit in one vector register (at least one).
    pub fn natural_vector_size(&self, t: crate::ir::Type) -> i64 {
        let bits = i64::from(t.bits.max(1));
        (i64::from(self.vector_bits) / bits).max(1)
    }
}

impl Default for Target {
    fn default() -> Self {
        Target::AVX2
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit vectors", self.vector_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Type;

    #[test]
    fn lanes_per_register() {
        let t = Target::AVX2;
        assert_eq!(t.natural_vector_size(Type::uint(8)), 32);
        assert_eq!(t.natural_vector_size(Type::float(32)), 8);
        assert_eq!(Target::SSE.natural_vector_size(Type::float(64)), 2);
        assert_eq!(Target::new(32).natural_vector_size(Type::float(64)), 1);
    }

    #[test]
    fn presets() {
        assert_eq!(Target::from_name("avx512"), Some(Target::new(512)));
        assert_eq!(Target::from_name("neon"), Some(Target::SSE));
        assert_eq!(Target::from_name("mmx"), None);
    }
}
