//! A descriptor-ring memory interface between host "CPU" code and a
//! simulated NIC, modeling the zero-copy staging area a real network
//! driver hands frames through.
//!
//! Each slot is owned by exactly one side at a time. [`NicRing::load_frame`]
//! plays the NIC's part: find an NIC-owned slot, copy the frame in, flip it
//! to CPU-owned. [`NicRing::read_slot`] plays the CPU's part: refuse a
//! still-NIC-owned slot, otherwise copy the bytes out and hand the slot
//! back to the NIC.
//!
//! `slot_size` must be at least as large as the biggest frame the caller
//! will ever load; this crate has no notion of a frame's MTU and does not
//! enforce that bound itself.

use std::sync::Mutex;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NicError {
    #[error("descriptor ring is full, no NIC-owned slot available")]
    RingFull,
    #[error("slot {0} is not ready: still owned by the NIC")]
    SlotNotReady(usize),
}

/// Ownership of one descriptor's backing memory. The transition from
/// `Nic` to `Cpu` happens inside `load_frame` while the copy is in
/// progress; no intermediate state is ever observable from outside the
/// ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotOwner {
    Nic,
    Cpu,
}

struct Descriptor {
    length: usize,
    owner: SlotOwner,
}

struct RingState {
    memory: Vec<u8>,
    descriptors: Vec<Descriptor>,
    cursor: usize,
}

pub struct NicRing {
    slot_size: usize,
    state: Mutex<RingState>,
}

impl NicRing {
    pub fn new(slot_count: usize, slot_size: usize) -> NicRing {
        let descriptors = (0..slot_count)
            .map(|_| Descriptor {
                length: 0,
                owner: SlotOwner::Nic,
            })
            .collect();
        NicRing {
            slot_size,
            state: Mutex::new(RingState {
                memory: vec![0u8; slot_count * slot_size],
                descriptors,
                cursor: 0,
            }),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.state.lock().unwrap().descriptors.len()
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Scans at most one full revolution of the ring starting from the
    /// cursor for an NIC-owned slot, stages `data` into it, and flips it
    /// to CPU-owned. The scan order is round-robin but is not required to
    /// be strictly monotonic across calls.
    pub fn load_frame(&self, data: &[u8]) -> Result<usize, NicError> {
        let mut state = self.state.lock().unwrap();
        let slot_count = state.descriptors.len();
        let start = state.cursor;

        let mut found = None;
        for step in 0..slot_count {
            let index = (start + step) % slot_count;
            if state.descriptors[index].owner == SlotOwner::Nic {
                found = Some(index);
                break;
            }
        }
        let index = found.ok_or(NicError::RingFull)?;

        let slot_size = self.slot_size;
        let offset = index * slot_size;
        state.memory[offset..offset + data.len()].copy_from_slice(data);
        let descriptor = &mut state.descriptors[index];
        descriptor.length = data.len();
        descriptor.owner = SlotOwner::Cpu;
        state.cursor = (index + 1) % slot_count;

        Ok(index)
    }

    /// Copies the staged frame out of `slot_index` and returns the slot to
    /// NIC ownership. Fails if the slot has not been loaded (is still
    /// NIC-owned).
    pub fn read_slot(&self, slot_index: usize) -> Result<Vec<u8>, NicError> {
        let mut state = self.state.lock().unwrap();
        let slot_size = self.slot_size;
        let descriptor = &mut state.descriptors[slot_index];
        if descriptor.owner != SlotOwner::Cpu {
            return Err(NicError::SlotNotReady(slot_index));
        }
        let length = descriptor.length;
        descriptor.owner = SlotOwner::Nic;

        let offset = slot_index * slot_size;
        Ok(state.memory[offset..offset + length].to_vec())
    }
}
