//! Network byte order codec.
//!
//! Every multi-byte value is big-endian. [`Reader`] never reads past its
//! buffer; [`Writer`] appends to a growable buffer.

use fiq_core::{
    BoundingBox, ElementDepth, FaceDetectorKind, FaceLandmarks, LandmarkKind, LandmarkPoint,
    Matrix, MeasureStatus, QualityMeasure, QualityMeasureResult, NOT_ASSESSABLE,
};
use ndarray::Array3;
use thiserror::Error;

/// Protocol format version carried in every header.
pub const FORMAT_VERSION: u64 = 1;

/// `cols` value marking a matrix the wire cannot represent.
const NO_MATRIX: i32 = -1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated message: {needed} bytes needed at offset {offset}, {remaining} left")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("format version {got} does not match {expected}")]
    VersionMismatch { expected: u64, got: u64 },
    #[error("invalid {what} value {value}")]
    InvalidTag { what: &'static str, value: i64 },
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),
}

/// Fixed-width value with a big-endian wire form.
pub trait WireScalar: Copy {
    const SIZE: usize;

    fn put(self, out: &mut Vec<u8>);

    /// Decode from exactly `SIZE` bytes.
    fn take(bytes: &[u8]) -> Self;
}

macro_rules! wire_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl WireScalar for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn put(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_be_bytes());
                }

                fn take(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_be_bytes(raw)
                }
            }
        )*
    };
}

wire_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Consume the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read<T: WireScalar>(&mut self) -> Result<T, DecodeError> {
        self.read_bytes(T::SIZE).map(T::take)
    }

    fn read_array<T: WireScalar>(&mut self, count: usize) -> Result<Vec<T>, DecodeError> {
        let len = count.checked_mul(T::SIZE).ok_or_else(|| {
            DecodeError::InvalidDimensions(format!("{count} elements overflow the address space"))
        })?;
        Ok(self.read_bytes(len)?.chunks_exact(T::SIZE).map(T::take).collect())
    }

    /// Read the version and command code, rejecting other format versions.
    pub fn read_header(&mut self) -> Result<u8, DecodeError> {
        let version: u64 = self.read()?;
        if version != FORMAT_VERSION {
            return Err(DecodeError::VersionMismatch {
                expected: FORMAT_VERSION,
                got: version,
            });
        }
        self.read()
    }

    pub fn read_bounding_box(&mut self) -> Result<BoundingBox, DecodeError> {
        let xleft = self.read()?;
        let ytop = self.read()?;
        let width = self.read()?;
        let height = self.read()?;
        let code: u8 = self.read()?;
        let detector = FaceDetectorKind::from_code(code).ok_or(DecodeError::InvalidTag {
            what: "face detector",
            value: code as i64,
        })?;
        Ok(BoundingBox {
            xleft,
            ytop,
            width,
            height,
            detector,
        })
    }

    pub fn read_landmarks(&mut self) -> Result<FaceLandmarks, DecodeError> {
        let code: u8 = self.read()?;
        let kind = LandmarkKind::from_code(code).ok_or(DecodeError::InvalidTag {
            what: "landmark type",
            value: code as i64,
        })?;
        let count: u32 = self.read()?;
        let coords = self.read_array::<i16>(count as usize * 2)?;
        let points = coords
            .chunks_exact(2)
            .map(|xy| LandmarkPoint::new(xy[0], xy[1]))
            .collect();
        Ok(FaceLandmarks { kind, points })
    }

    /// Read a matrix; `None` when the sender marked it unrepresentable.
    pub fn read_matrix(&mut self) -> Result<Option<Matrix>, DecodeError> {
        let cols: i32 = self.read()?;
        if cols == NO_MATRIX {
            return Ok(None);
        }
        let rows: i32 = self.read()?;
        let channels: i32 = self.read()?;
        let code: u8 = self.read()?;
        let depth = ElementDepth::from_code(code).ok_or(DecodeError::InvalidTag {
            what: "matrix depth",
            value: code as i64,
        })?;

        if cols < 0 || rows < 0 || channels < 1 {
            return Err(DecodeError::InvalidDimensions(format!(
                "{rows} rows, {cols} cols, {channels} channels"
            )));
        }
        let shape = (rows as usize, cols as usize, channels as usize);
        let count = shape
            .0
            .checked_mul(shape.1)
            .and_then(|n| n.checked_mul(shape.2))
            .ok_or_else(|| DecodeError::InvalidDimensions(format!("{shape:?} overflows")))?;

        macro_rules! read_as {
            ($variant:ident, $t:ty) => {{
                let data = self.read_array::<$t>(count)?;
                let array = Array3::from_shape_vec(shape, data)
                    .map_err(|e| DecodeError::InvalidDimensions(e.to_string()))?;
                Matrix::$variant(array)
            }};
        }

        let matrix = match depth {
            ElementDepth::U8 => read_as!(U8, u8),
            ElementDepth::I8 => read_as!(I8, i8),
            ElementDepth::U16 => read_as!(U16, u16),
            ElementDepth::I16 => read_as!(I16, i16),
            ElementDepth::I32 => read_as!(I32, i32),
            ElementDepth::F32 => read_as!(F32, f32),
            ElementDepth::F64 => read_as!(F64, f64),
        };
        Ok(Some(matrix))
    }

    pub fn read_measure(&mut self) -> Result<(QualityMeasure, QualityMeasureResult), DecodeError> {
        let id: i16 = self.read()?;
        let measure = QualityMeasure::from_id(id).ok_or(DecodeError::InvalidTag {
            what: "quality measure",
            value: id as i64,
        })?;
        let code: u8 = self.read()?;
        let status = MeasureStatus::from_code(code).ok_or(DecodeError::InvalidTag {
            what: "measure status",
            value: code as i64,
        })?;
        let scalar = self.read()?;
        let raw_score = self.read()?;
        Ok((
            measure,
            QualityMeasureResult {
                raw_score,
                scalar,
                status,
            },
        ))
    }

    /// Log a warning if the body left bytes unread.
    pub fn check_end(&self) {
        if self.remaining() > 0 {
            tracing::warn!(
                leftover = self.remaining(),
                consumed = self.pos,
                "message has unread trailing bytes"
            );
        }
    }
}

#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write<T: WireScalar>(&mut self, value: T) {
        value.put(&mut self.buf);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_header(&mut self, command: u8) {
        self.write(FORMAT_VERSION);
        self.write(command);
    }

    pub fn write_bounding_box(&mut self, bbox: &BoundingBox) {
        self.write(bbox.xleft);
        self.write(bbox.ytop);
        self.write(bbox.width);
        self.write(bbox.height);
        self.write(bbox.detector.code());
    }

    pub fn write_landmarks(&mut self, landmarks: &FaceLandmarks) {
        self.write(landmarks.kind.code());
        self.write(landmarks.points.len() as u32);
        for p in &landmarks.points {
            self.write(p.x);
            self.write(p.y);
        }
    }

    /// Write a matrix, or the unrepresentable marker for element types and
    /// sizes the wire cannot carry.
    pub fn write_matrix(&mut self, matrix: &Matrix) {
        let (rows, cols, channels) = matrix.dim();
        let dims = (
            i32::try_from(cols),
            i32::try_from(rows),
            i32::try_from(channels),
        );
        let (Some(depth), (Ok(cols), Ok(rows), Ok(channels))) = (matrix.depth(), dims) else {
            tracing::warn!(dim = ?matrix.dim(), "matrix not representable, sending marker");
            self.write(NO_MATRIX);
            return;
        };

        self.write(cols);
        self.write(rows);
        self.write(channels);
        self.write(depth.code());

        macro_rules! write_elements {
            ($a:expr) => {{
                let contiguous = $a.as_standard_layout();
                for &v in contiguous.iter() {
                    self.write(v);
                }
            }};
        }

        match matrix {
            Matrix::U8(a) => {
                let contiguous = a.as_standard_layout();
                match contiguous.as_slice() {
                    Some(bytes) => self.write_bytes(bytes),
                    None => write_elements!(a),
                }
            }
            Matrix::I8(a) => write_elements!(a),
            Matrix::U16(a) => write_elements!(a),
            Matrix::I16(a) => write_elements!(a),
            Matrix::I32(a) => write_elements!(a),
            Matrix::F32(a) => write_elements!(a),
            Matrix::F64(a) => write_elements!(a),
            // No wire depth; the marker was written above.
            Matrix::F16(_) => {}
        }
    }

    /// [`write_matrix`](Self::write_matrix), or the marker when absent.
    pub fn write_optional_matrix(&mut self, matrix: Option<&Matrix>) {
        match matrix {
            Some(m) => self.write_matrix(m),
            None => self.write(NO_MATRIX),
        }
    }

    /// Measure entry; the scalar is forced to the not-assessable value
    /// unless the status is success.
    pub fn write_measure(&mut self, measure: QualityMeasure, result: &QualityMeasureResult) {
        self.write(measure.id());
        self.write(result.status.code());
        let scalar = if result.is_success() {
            result.scalar
        } else {
            NOT_ASSESSABLE
        };
        self.write(scalar);
        self.write(result.raw_score);
    }
}
