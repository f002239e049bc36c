//! Multi-channel 2-D sample grids (aligned face, masks, transformation matrix).
//!
//! Each variant holds an `ndarray::Array3` shaped `(rows, cols, channels)`.
//! Arrays may be non-contiguous (slices, permuted axes); the wire writer
//! copies them into standard layout before emitting elements.

use ndarray::Array3;

/// Element depth codes as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementDepth {
    U8,
    I8,
    U16,
    I16,
    I32,
    F32,
    F64,
}

impl ElementDepth {
    pub fn code(self) -> u8 {
        match self {
            Self::U8 => 0,
            Self::I8 => 1,
            Self::U16 => 2,
            Self::I16 => 3,
            Self::I32 => 4,
            Self::F32 => 5,
            Self::F64 => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::U8),
            1 => Some(Self::I8),
            2 => Some(Self::U16),
            3 => Some(Self::I16),
            4 => Some(Self::I32),
            5 => Some(Self::F32),
            6 => Some(Self::F64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Matrix {
    U8(Array3<u8>),
    I8(Array3<i8>),
    U16(Array3<u16>),
    I16(Array3<i16>),
    I32(Array3<i32>),
    F32(Array3<f32>),
    F64(Array3<f64>),
    /// Half-precision samples stored as raw bit patterns. Not representable
    /// on the wire.
    F16(Array3<u16>),
}

macro_rules! for_each_variant {
    ($self:expr, $arr:ident => $body:expr) => {
        match $self {
            Matrix::U8($arr) => $body,
            Matrix::I8($arr) => $body,
            Matrix::U16($arr) => $body,
            Matrix::I16($arr) => $body,
            Matrix::I32($arr) => $body,
            Matrix::F32($arr) => $body,
            Matrix::F64($arr) => $body,
            Matrix::F16($arr) => $body,
        }
    };
}

impl Matrix {
    /// `(rows, cols, channels)`.
    pub fn dim(&self) -> (usize, usize, usize) {
        for_each_variant!(self, a => a.dim())
    }

    /// Wire depth, or `None` for element types the wire cannot carry.
    pub fn depth(&self) -> Option<ElementDepth> {
        match self {
            Matrix::U8(_) => Some(ElementDepth::U8),
            Matrix::I8(_) => Some(ElementDepth::I8),
            Matrix::U16(_) => Some(ElementDepth::U16),
            Matrix::I16(_) => Some(ElementDepth::I16),
            Matrix::I32(_) => Some(ElementDepth::I32),
            Matrix::F32(_) => Some(ElementDepth::F32),
            Matrix::F64(_) => Some(ElementDepth::F64),
            Matrix::F16(_) => None,
        }
    }

    /// Single-channel u8 mask from a row-major buffer.
    pub fn mask(rows: usize, cols: usize, data: Vec<u8>) -> Option<Self> {
        Array3::from_shape_vec((rows, cols, 1), data)
            .ok()
            .map(Matrix::U8)
    }
}
