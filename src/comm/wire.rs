//! Fixed, versioned, little-endian wire types for round payloads.
//!
//! A payload sent to one peer in one round is a sequence of *sections*.
//! Each section is a [`WireSection`] header followed by `count` records of
//! `record_len` bytes. Vertex-addressed records start with the target's gid
//! as a [`WireGid`]; fragment-addressed records carry opaque bytes.

use bytemuck::{Pod, Zeroable};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::mem::size_of;

use crate::bsp_error::BspError;
use crate::fragment::vertex::Gid;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), BspError> {
    if actual == expected {
        Ok(())
    } else {
        Err(BspError::WireError(format!(
            "expected {expected} bytes, got {actual}"
        )))
    }
}

/// Read a `T` from the front of `bytes`, which need not be aligned.
pub fn read_pod<T: Pod>(bytes: &[u8]) -> Result<T, BspError> {
    if bytes.len() < size_of::<T>() {
        return Err(BspError::WireError(format!(
            "truncated record: need {} bytes, have {}",
            size_of::<T>(),
            bytes.len()
        )));
    }
    Ok(bytemuck::pod_read_unaligned(&bytes[..size_of::<T>()]))
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Section kinds.
pub const KIND_AUTO: u16 = 1;
pub const KIND_VERTEX: u16 = 2;
pub const KIND_FRAGMENT: u16 = 3;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireSection {
    pub version_le: u16,
    pub kind_le: u16,
    /// Registration slot for `KIND_AUTO`; zero otherwise.
    pub slot_le: u32,
    pub count_le: u32,
    /// Bytes per record, including the gid prefix when present.
    pub record_len_le: u32,
}

impl WireSection {
    pub fn new(kind: u16, slot: u32, count: usize, record_len: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            slot_le: slot.to_le(),
            count_le: (count as u32).to_le(),
            record_len_le: (record_len as u32).to_le(),
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn slot(&self) -> u32 {
        u32::from_le(self.slot_le)
    }
    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }
    pub fn record_len(&self) -> usize {
        u32::from_le(self.record_len_le) as usize
    }
}

/// Payload length announced in the size phase of a round exchange.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireLen(pub u64);

impl WireLen {
    pub fn new(n: usize) -> Self {
        WireLen((n as u64).to_le())
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.0) as usize
    }
}

/// A gid carried on the wire.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireGid {
    pub gid_le: u64,
}

impl WireGid {
    pub fn of(gid: Gid) -> Self {
        Self { gid_le: gid.to_le() }
    }
    pub fn get(&self) -> Gid {
        u64::from_le(self.gid_le)
    }
}

/// One fragment's termination vote, summed across the group.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireVote {
    pub sent_le: u64,
    pub force_continue_le: u64,
    pub force_terminate_le: u64,
}

impl WireVote {
    pub fn new(sent: u64, force_continue: bool, force_terminate: bool) -> Self {
        Self {
            sent_le: sent.to_le(),
            force_continue_le: u64::from(force_continue).to_le(),
            force_terminate_le: u64::from(force_terminate).to_le(),
        }
    }
    pub fn sent(&self) -> u64 {
        u64::from_le(self.sent_le)
    }
    pub fn force_continue(&self) -> u64 {
        u64::from_le(self.force_continue_le)
    }
    pub fn force_terminate(&self) -> u64 {
        u64::from_le(self.force_terminate_le)
    }
    pub fn sum(self, other: Self) -> Self {
        Self {
            sent_le: (self.sent().wrapping_add(other.sent())).to_le(),
            force_continue_le: (self.force_continue() + other.force_continue()).to_le(),
            force_terminate_le: (self.force_terminate() + other.force_terminate()).to_le(),
        }
    }
}

/// Sections destined for one peer in the current round.
#[derive(Default, Debug)]
pub struct SectionWriter {
    buf: BytesMut,
    sections: usize,
}

impl SectionWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sections == 0
    }

    pub fn sections(&self) -> usize {
        self.sections
    }

    /// Append a section whose records were already laid out in `records`.
    pub fn push_section(&mut self, kind: u16, slot: u32, record_len: usize, records: &[u8]) {
        let count = if record_len == 0 { 0 } else { records.len() / record_len };
        if count == 0 {
            return;
        }
        let hdr = WireSection::new(kind, slot, count, record_len);
        self.buf.put_slice(cast_slice(std::slice::from_ref(&hdr)));
        self.buf.put_slice(&records[..count * record_len]);
        self.sections += 1;
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// One decoded section borrowing the received payload.
#[derive(Debug, Clone)]
pub struct Section {
    pub kind: u16,
    pub slot: u32,
    pub record_len: usize,
    pub records: Bytes,
}

impl Section {
    pub fn count(&self) -> usize {
        if self.record_len == 0 {
            0
        } else {
            self.records.len() / self.record_len
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.records.chunks_exact(self.record_len.max(1))
    }
}

/// Split `payload` into sections, validating version and lengths.
pub fn read_sections(mut payload: Bytes) -> Result<Vec<Section>, BspError> {
    let mut out = Vec::new();
    while payload.has_remaining() {
        let hdr: WireSection = read_pod(&payload)?;
        payload.advance(size_of::<WireSection>());
        if hdr.version() != WIRE_VERSION {
            return Err(BspError::WireError(format!(
                "unsupported wire version {} (expected {WIRE_VERSION})",
                hdr.version()
            )));
        }
        let len = hdr.count() * hdr.record_len();
        if payload.remaining() < len {
            return Err(BspError::WireError(format!(
                "section of {} records truncated: need {len} bytes, have {}",
                hdr.count(),
                payload.remaining()
            )));
        }
        out.push(Section {
            kind: hdr.kind(),
            slot: hdr.slot(),
            record_len: hdr.record_len(),
            records: payload.split_to(len),
        });
    }
    Ok(out)
}

// ===== Compile-time sanity checks =========================================

const _: () = {
    assert!(size_of::<WireSection>() == 16);
    assert!(size_of::<WireLen>() == 8);
    assert!(size_of::<WireGid>() == 8);
    assert!(size_of::<WireVote>() == 24);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_survive_framing() {
        let mut w = SectionWriter::new();
        let mut recs = Vec::new();
        for (gid, val) in [(5u64, 7u32), (9, 1)] {
            recs.extend_from_slice(cast_slice(&[WireGid::of(gid)]));
            recs.extend_from_slice(&val.to_le_bytes());
        }
        w.push_section(KIND_AUTO, 3, 12, &recs);
        w.push_section(KIND_FRAGMENT, 0, 2, &[1, 2]);
        w.push_section(KIND_VERTEX, 0, 12, &[]);
        assert_eq!(w.sections(), 2);

        let sections = read_sections(w.freeze()).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!((sections[0].kind, sections[0].slot), (KIND_AUTO, 3));
        let gids: Vec<Gid> = sections[0]
            .iter()
            .map(|r| read_pod::<WireGid>(r).unwrap().get())
            .collect();
        assert_eq!(gids, vec![5, 9]);
        assert_eq!(sections[1].count(), 1);
    }

    #[test]
    fn truncated_section_is_rejected() {
        let mut w = SectionWriter::new();
        w.push_section(KIND_VERTEX, 0, 4, &[0; 8]);
        let bytes = w.freeze();
        let cut = bytes.slice(..bytes.len() - 1);
        assert!(matches!(read_sections(cut), Err(BspError::WireError(_))));
    }

    #[test]
    fn version_guard() {
        let mut hdr = WireSection::new(KIND_AUTO, 0, 0, 0);
        assert_eq!(hdr.version(), WIRE_VERSION);
        hdr.version_le = 99u16.to_le();
        let bytes = Bytes::copy_from_slice(cast_slice(&[hdr]));
        assert!(read_sections(bytes).is_err());
    }

    #[test]
    fn votes_sum_fieldwise() {
        let v = WireVote::new(3, false, true).sum(WireVote::new(2, true, false));
        assert_eq!((v.sent(), v.force_continue(), v.force_terminate()), (5, 1, 1));
    }
}
