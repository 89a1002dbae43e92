// features.rs — Per-stage operator and access histograms
//
// `PipelineFeatures` is the fixed-shape record a cost model consumes for each
// stage. It is filled through named `record_*` methods by the featurizer and
// never interpreted here.

use std::fmt;

use serde::Serialize;

use crate::ir::Type;
use crate::jacobian::{AccessClasses, AccessPattern};

// ── Buckets ──────────────────────────────────────────────────────────────

/// Coarse scalar type: bit width and floatness only, so `int17` and `int32`
/// land in the same bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScalarType {
    Bool,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
}

impl ScalarType {
    pub const COUNT: usize = 7;

    pub const ALL: [ScalarType; ScalarType::COUNT] = [
        ScalarType::Bool,
        ScalarType::UInt8,
        ScalarType::UInt16,
        ScalarType::UInt32,
        ScalarType::UInt64,
        ScalarType::Float,
        ScalarType::Double,
    ];

    pub fn of(t: Type) -> ScalarType {
        if t.is_bool() {
            ScalarType::Bool
        } else if t.is_float() {
            if t.bits > 32 {
                ScalarType::Double
            } else {
                ScalarType::Float
            }
        } else if t.bits <= 8 {
            ScalarType::UInt8
        } else if t.bits <= 16 {
            ScalarType::UInt16
        } else if t.bits <= 32 {
            ScalarType::UInt32
        } else {
            ScalarType::UInt64
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::UInt8 => "u8",
            ScalarType::UInt16 => "u16",
            ScalarType::UInt32 => "u32",
            ScalarType::UInt64 => "u64",
            ScalarType::Float => "f32",
            ScalarType::Double => "f64",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OpType {
    Const,
    Cast,
    Variable,
    Param,
    Add,
    Sub,
    Mod,
    Mul,
    Div,
    Min,
    Max,
    EQ,
    NE,
    LT,
    LE,
    And,
    Or,
    Not,
    Select,
    ImageCall,
    FuncCall,
    SelfCall,
    ExternCall,
    Let,
}

impl OpType {
    pub const COUNT: usize = 24;

    pub const ALL: [OpType; OpType::COUNT] = [
        OpType::Const,
        OpType::Cast,
        OpType::Variable,
        OpType::Param,
        OpType::Add,
        OpType::Sub,
        OpType::Mod,
        OpType::Mul,
        OpType::Div,
        OpType::Min,
        OpType::Max,
        OpType::EQ,
        OpType::NE,
        OpType::LT,
        OpType::LE,
        OpType::And,
        OpType::Or,
        OpType::Not,
        OpType::Select,
        OpType::ImageCall,
        OpType::FuncCall,
        OpType::SelfCall,
        OpType::ExternCall,
        OpType::Let,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AccessType {
    LoadFunc,
    LoadSelf,
    LoadImage,
    Store,
}

impl AccessType {
    pub const COUNT: usize = 4;

    pub const ALL: [AccessType; AccessType::COUNT] = [
        AccessType::LoadFunc,
        AccessType::LoadSelf,
        AccessType::LoadImage,
        AccessType::Store,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

type Histogram<const N: usize> = [[u32; ScalarType::COUNT]; N];

// ── PipelineFeatures ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PipelineFeatures {
    /// `[OpType][ScalarType]` operation counts.
    pub op_histogram: Histogram<{ OpType::COUNT }>,
    pub types_in_use: [bool; ScalarType::COUNT],
    /// `[AccessType][ScalarType]` access counts, one table per pattern.
    pub pointwise_accesses: Histogram<{ AccessType::COUNT }>,
    pub transpose_accesses: Histogram<{ AccessType::COUNT }>,
    pub broadcast_accesses: Histogram<{ AccessType::COUNT }>,
    pub slice_accesses: Histogram<{ AccessType::COUNT }>,
}

impl PipelineFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_op(&mut self, op: OpType, ty: ScalarType) {
        self.op_histogram[op.index()][ty.index()] += 1;
    }

    pub fn mark_type(&mut self, ty: ScalarType) {
        self.types_in_use[ty.index()] = true;
    }

    /// Count one access in every table whose pattern it matches.
    pub fn record_access(&mut self, classes: AccessClasses, access: AccessType, ty: ScalarType) {
        for pattern in classes.patterns() {
            let table = match pattern {
                AccessPattern::Pointwise => &mut self.pointwise_accesses,
                AccessPattern::Transpose => &mut self.transpose_accesses,
                AccessPattern::Broadcast => &mut self.broadcast_accesses,
                AccessPattern::Slice => &mut self.slice_accesses,
            };
            table[access.index()][ty.index()] += 1;
        }
    }

    pub fn op_count(&self, op: OpType, ty: ScalarType) -> u32 {
        self.op_histogram[op.index()][ty.index()]
    }

    /// Count of `op` across every scalar type.
    pub fn op_total(&self, op: OpType) -> u32 {
        self.op_histogram[op.index()].iter().sum()
    }

    pub fn access_count(&self, pattern: AccessPattern, access: AccessType, ty: ScalarType) -> u32 {
        let table = match pattern {
            AccessPattern::Pointwise => &self.pointwise_accesses,
            AccessPattern::Transpose => &self.transpose_accesses,
            AccessPattern::Broadcast => &self.broadcast_accesses,
            AccessPattern::Slice => &self.slice_accesses,
        };
        table[access.index()][ty.index()]
    }

    pub fn uses_type(&self, ty: ScalarType) -> bool {
        self.types_in_use[ty.index()]
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, label: &str, row: &[u32; ScalarType::COUNT]) -> fmt::Result {
    if row.iter().all(|&c| c == 0) {
        return Ok(());
    }
    write!(f, "    {label:<14}")?;
    for c in row {
        write!(f, " {c:>4}")?;
    }
    writeln!(f)
}

impl fmt::Display for PipelineFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "    {:<14}", "")?;
        for t in ScalarType::ALL {
            write!(f, " {:>4}", t.short_name())?;
        }
        writeln!(f)?;
        for op in OpType::ALL {
            write_row(f, &format!("{op:?}"), &self.op_histogram[op.index()])?;
        }
        let tables = [
            ("pointwise", &self.pointwise_accesses),
            ("transpose", &self.transpose_accesses),
            ("broadcast", &self.broadcast_accesses),
            ("slice", &self.slice_accesses),
        ];
        for (name, table) in tables {
            for access in AccessType::ALL {
                write_row(f, &format!("{name}:{access:?}"), &table[access.index()])?;
            }
        }
        Ok(())
    }
}
