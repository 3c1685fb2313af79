//! Binary encoding primitives for persisted results
//!
//! - Counts and ids: unsigned LEB128 (`VarUInt`), at most 5 bytes for `u32`
//! - Tags: a single byte
//! - Doubles: IEEE-754, big-endian
//!
//! Phases and metrics are written as their ids and resolved on read through
//! an [`IdentityContext`], so a result file is only meaningful next to the
//! execution model and metric registry it was written against.

use crate::error::CodecError;
use crate::model::{ExecutionModel, Metric, MetricId, MetricRegistry, Phase, PhaseId};
use std::sync::Arc;

/// Append-only byte buffer
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Unsigned LEB128
    pub fn write_var_u32(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    /// Write a collection length; lengths beyond `u32::MAX` are not representable
    pub fn write_len(&mut self, len: usize) -> Result<(), CodecError> {
        let len32 = u32::try_from(len).map_err(|_| CodecError::LengthOverflow(len))?;
        self.write_var_u32(len32);
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_phase(&mut self, phase: &Phase) {
        self.write_var_u32(phase.id().0);
    }

    pub fn write_metric(&mut self, metric: &Metric) {
        self.write_var_u32(metric.id().0);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an encoded buffer
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let byte = *self.buf.get(self.pos).ok_or(CodecError::Truncated {
            offset: self.pos,
            needed: 1,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_var_u32(&mut self) -> Result<u32, CodecError> {
        let start = self.pos;
        let mut result: u32 = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            let low = u32::from(byte & 0x7f);
            // The fifth byte may only carry the top 4 bits
            if shift == 28 && low > 0x0f {
                return Err(CodecError::VarIntOverflow(start));
            }
            result |= low << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(CodecError::VarIntOverflow(start))
    }

    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        Ok(self.read_var_u32()? as usize)
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_be_bytes(raw))
    }

    pub fn read_phase(&mut self, ctx: &dyn IdentityContext) -> Result<Arc<Phase>, CodecError> {
        let id = PhaseId(self.read_var_u32()?);
        ctx.phase(id).ok_or(CodecError::UnknownPhase(id.0))
    }

    pub fn read_metric(&mut self, ctx: &dyn IdentityContext) -> Result<Arc<Metric>, CodecError> {
        let id = MetricId(self.read_var_u32()?);
        ctx.metric(id).ok_or(CodecError::UnknownMetric(id.0))
    }
}

/// Resolves serialized phase and metric ids back to live entities
pub trait IdentityContext {
    fn phase(&self, id: PhaseId) -> Option<Arc<Phase>>;

    fn metric(&self, id: MetricId) -> Option<Arc<Metric>>;
}

/// Identity context over an execution model and a metric registry
#[derive(Debug, Clone, Copy)]
pub struct ModelContext<'a> {
    pub model: &'a ExecutionModel,
    pub registry: &'a MetricRegistry,
}

impl<'a> ModelContext<'a> {
    pub fn new(model: &'a ExecutionModel, registry: &'a MetricRegistry) -> Self {
        Self { model, registry }
    }
}

impl IdentityContext for ModelContext<'_> {
    fn phase(&self, id: PhaseId) -> Option<Arc<Phase>> {
        self.model.phase(id).cloned()
    }

    fn metric(&self, id: MetricId) -> Option<Arc<Metric>> {
        self.registry.metric(id).cloned()
    }
}
