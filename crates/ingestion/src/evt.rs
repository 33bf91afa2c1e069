//! `.evt` binary codec
//!
//! Little-endian stream of self-sized events:
//!
//! ```text
//! header   size u32 | type u32 (1 = DPP, 2 = waveform) | channel u32 | timetag u32
//! DPP      extraSelect u16 | extras lo u16 | extras hi u16 | sgQ u16 | lgQ u16 | baseline u16 | probe u16
//! trailer  nSamples u32 | samples u16 * nSamples
//! ```
//!
//! `extraSelect` 0, 1 and 2 carry the extended timestamp in `hi`; 2 also
//! carries the fine time in the low ten bits of `lo`. Selector 5 carries CFD
//! zero crossings and no extended time.

use std::io::Write;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use contracts::{ChannelId, EventMode, RawEvent};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};

const HEADER_BYTES: usize = 16;
const DPP_BODY_BYTES: usize = 14;
const TRAILER_BYTES: usize = 4;
const FINE_TIME_MASK: u16 = 0x03ff;

/// Meaning of the DPP EXTRAS word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtrasLayout {
    /// Extended time and baseline
    ExtendedBaseline,
    /// Extended time and flags
    ExtendedFlags,
    /// Extended time, flags and fine time
    ExtendedFineTime,
    /// Positive and negative zero crossings
    ZeroCrossings,
}

impl ExtrasLayout {
    pub fn from_selector(extra_select: u16) -> Option<Self> {
        match extra_select {
            0 => Some(Self::ExtendedBaseline),
            1 => Some(Self::ExtendedFlags),
            2 => Some(Self::ExtendedFineTime),
            5 => Some(Self::ZeroCrossings),
            _ => None,
        }
    }

    pub fn selector(self) -> u16 {
        match self {
            Self::ExtendedBaseline => 0,
            Self::ExtendedFlags => 1,
            Self::ExtendedFineTime => 2,
            Self::ZeroCrossings => 5,
        }
    }
}

/// Streaming decoder over an in-memory buffer
pub struct EvtReader<B> {
    buf: B,
    offset: usize,
    metrics: Arc<IngestionMetrics>,
}

impl EvtReader<Bytes> {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(bytes.into(), Arc::new(IngestionMetrics::new()))
    }
}

impl<B: Buf> EvtReader<B> {
    pub fn new(buf: B, metrics: Arc<IngestionMetrics>) -> Self {
        Self {
            buf,
            offset: 0,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.metrics
    }

    /// Byte offset of the next event
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn require(&self, needed: usize, event_start: usize) -> Result<()> {
        let available = self.buf.remaining();
        if available < needed {
            return Err(IngestionError::Truncated {
                offset: event_start,
                needed,
                available,
            });
        }
        Ok(())
    }

    /// Decode the next event, `None` at a clean end of stream
    pub fn next_event(&mut self) -> Result<Option<RawEvent>> {
        if !self.buf.has_remaining() {
            return Ok(None);
        }
        let start = self.offset;
        let before = self.buf.remaining();

        self.require(HEADER_BYTES, start)?;
        let size = self.buf.get_u32_le() as usize;
        let code = self.buf.get_u32_le();
        let channel = ChannelId::new(self.buf.get_u32_le());
        let timetag = self.buf.get_u32_le();

        let mode = EventMode::from_code(code)
            .ok_or(IngestionError::UnknownEventType { offset: start, code })?;

        let mut event = match mode {
            EventMode::Dpp => self.read_dpp_body(channel, timetag, start)?,
            EventMode::Waveform => RawEvent::waveform(channel, 0, timetag, Vec::new()),
        };

        self.require(TRAILER_BYTES, start)?;
        let samples = self.buf.get_u32_le() as usize;
        self.require(samples * 2, start)?;
        let mut waveform = Vec::with_capacity(samples);
        for _ in 0..samples {
            waveform.push(self.buf.get_u16_le());
        }
        event.waveform = waveform;

        let mut consumed = before - self.buf.remaining();
        if size != consumed {
            self.metrics.record_size_mismatch();
            tracing::debug!(offset = start, size, consumed, "event size mismatch");
            if size > consumed && self.buf.remaining() >= size - consumed {
                self.buf.advance(size - consumed);
                consumed = size;
            }
        }

        self.offset += consumed;
        self.metrics
            .record_decoded(mode == EventMode::Waveform, consumed);
        Ok(Some(event))
    }

    fn read_dpp_body(&mut self, channel: ChannelId, timetag: u32, start: usize) -> Result<RawEvent> {
        self.require(DPP_BODY_BYTES, start)?;
        let extra_select = self.buf.get_u16_le();
        let lo = self.buf.get_u16_le();
        let hi = self.buf.get_u16_le();
        let short_gate = self.buf.get_u16_le();
        let long_gate = self.buf.get_u16_le();
        let _baseline = self.buf.get_u16_le();
        let _probe = self.buf.get_u16_le();

        let layout = ExtrasLayout::from_selector(extra_select).ok_or(
            IngestionError::UnsupportedExtras {
                offset: start,
                extra_select,
            },
        )?;

        let event = match layout {
            ExtrasLayout::ExtendedBaseline | ExtrasLayout::ExtendedFlags => {
                RawEvent::dpp(channel, u32::from(hi), timetag)
            }
            ExtrasLayout::ExtendedFineTime => {
                RawEvent::dpp(channel, u32::from(hi), timetag).with_fine_time(lo & FINE_TIME_MASK)
            }
            ExtrasLayout::ZeroCrossings => RawEvent::dpp(channel, 0, timetag),
        };
        Ok(event.with_charges(short_gate, long_gate))
    }
}

impl<B: Buf> Iterator for EvtReader<B> {
    type Item = Result<RawEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

/// Decode a whole buffer
pub fn decode_all(bytes: impl Into<Bytes>, metrics: Arc<IngestionMetrics>) -> Result<Vec<RawEvent>> {
    EvtReader::new(bytes.into(), metrics).collect()
}

/// Append one event in `.evt` layout
///
/// DPP events are written with selector 2 when they carry a fine time and
/// selector 0 otherwise. Waveform events have no extended time on disk.
pub fn encode_event(event: &RawEvent, out: &mut BytesMut) -> Result<()> {
    let samples = event.waveform.len();
    let body = match event.mode {
        EventMode::Dpp => DPP_BODY_BYTES,
        EventMode::Waveform => 0,
    };
    let size = HEADER_BYTES + body + TRAILER_BYTES + samples * 2;

    out.reserve(size);
    out.put_u32_le(size as u32);
    out.put_u32_le(event.mode.code());
    out.put_u32_le(event.channel.get());
    out.put_u32_le(event.coarse_time);

    if event.mode == EventMode::Dpp {
        let extended = u16::try_from(event.extended_time).map_err(|_| IngestionError::Encode {
            message: format!(
                "extended time {} does not fit the 16-bit extras word",
                event.extended_time
            ),
        })?;
        let (layout, lo) = match event.fine_time {
            Some(fine) => (ExtrasLayout::ExtendedFineTime, fine & FINE_TIME_MASK),
            None => (ExtrasLayout::ExtendedBaseline, 0),
        };
        out.put_u16_le(layout.selector());
        out.put_u16_le(lo);
        out.put_u16_le(extended);
        out.put_u16_le(event.short_gate_charge);
        out.put_u16_le(event.long_gate_charge);
        out.put_u16_le(0);
        out.put_u16_le(0);
    }

    out.put_u32_le(samples as u32);
    for &sample in &event.waveform {
        out.put_u16_le(sample);
    }
    Ok(())
}

/// Buffered `.evt` writer
pub struct EvtWriter<W: Write> {
    inner: W,
    scratch: BytesMut,
    events: u64,
}

impl<W: Write> EvtWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            scratch: BytesMut::with_capacity(4096),
            events: 0,
        }
    }

    pub fn write_event(&mut self, event: &RawEvent) -> Result<()> {
        self.scratch.clear();
        encode_event(event, &mut self.scratch)?;
        self.inner.write_all(&self.scratch)?;
        self.events += 1;
        Ok(())
    }

    pub fn events_written(&self) -> u64 {
        self.events
    }

    /// Flush and hand back the inner writer
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
