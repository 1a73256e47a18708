use crc32fast::hash;
#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

use crate::aim::Axis;
use crate::servo::Position;

pub const N_SLOTS: usize = 5;

pub const PRESET_MAGIC: [u8; 4] = *b"LCP1";
pub const PRESET_BLOB_SIZE: usize = 48;

const SLOT_SIZE: usize = 4;
const SLOTS_START: usize = 4;
const CRC_START: usize = SLOTS_START + 2 * N_SLOTS * SLOT_SIZE;
const EMPTY: u16 = 0xFFFF;

const_assert_eq!(CRC_START + 4, PRESET_BLOB_SIZE);

/// Saved positions for one assembly.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresetBank {
    slots: [Option<Position>; N_SLOTS],
}

impl PresetBank {
    pub fn get(&self, slot: usize) -> Option<Position> {
        self.slots.get(slot).copied().flatten()
    }

    /// Returns false when the slot index is out of range.
    pub fn set(&mut self, slot: usize, position: Position) -> bool {
        match self.slots.get_mut(slot) {
            Some(s) => {
                *s = Some(position);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<Position>> + '_ {
        self.slots.iter().copied()
    }
}

/// Both preset banks, persisted as one blob.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresetStore {
    pub camera: PresetBank,
    pub laser: PresetBank,
}

impl PresetStore {
    pub fn bank(&self, axis: Axis) -> &PresetBank {
        match axis {
            Axis::Laser => &self.laser,
            Axis::Camera => &self.camera,
        }
    }

    pub fn bank_mut(&mut self, axis: Axis) -> &mut PresetBank {
        match axis {
            Axis::Laser => &mut self.laser,
            Axis::Camera => &mut self.camera,
        }
    }

    /// magic | camera slots 0..5 | laser slots 0..5 | crc32
    ///
    /// Each slot is `x u16 LE, y u16 LE`; an empty slot stores `0xFFFF` for x.
    pub fn to_bytes(&self) -> [u8; PRESET_BLOB_SIZE] {
        let mut bytes = [0u8; PRESET_BLOB_SIZE];
        bytes[0..SLOTS_START].copy_from_slice(&PRESET_MAGIC);

        let slots = self.camera.iter().chain(self.laser.iter());
        for (i, slot) in slots.enumerate() {
            let at = SLOTS_START + i * SLOT_SIZE;
            let (x, y) = match slot {
                Some(p) => (p.x, p.y),
                None => (EMPTY, EMPTY),
            };
            bytes[at..at + 2].copy_from_slice(&x.to_le_bytes());
            bytes[at + 2..at + 4].copy_from_slice(&y.to_le_bytes());
        }

        let crc = hash(&bytes[..CRC_START]);
        bytes[CRC_START..].copy_from_slice(&crc.to_le_bytes());
        bytes
    }

    /// `None` for erased flash, a foreign blob, or a checksum mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < PRESET_BLOB_SIZE || bytes[0..SLOTS_START] != PRESET_MAGIC {
            return None;
        }
        let crc = u32::from_le_bytes(bytes[CRC_START..PRESET_BLOB_SIZE].try_into().ok()?);
        if crc != hash(&bytes[..CRC_START]) {
            return None;
        }

        let mut store = Self::default();
        for i in 0..2 * N_SLOTS {
            let at = SLOTS_START + i * SLOT_SIZE;
            let x = u16::from_le_bytes([bytes[at], bytes[at + 1]]);
            let y = u16::from_le_bytes([bytes[at + 2], bytes[at + 3]]);
            if x == EMPTY {
                continue;
            }
            let bank = if i < N_SLOTS {
                &mut store.camera
            } else {
                &mut store.laser
            };
            bank.set(i % N_SLOTS, Position::new(x, y));
        }
        Some(store)
    }
}

/// Where presets live between sessions.
pub trait PresetStorage {
    type Error;

    /// `Ok(None)` when nothing valid has been saved yet.
    fn load(&mut self) -> Result<Option<PresetStore>, Self::Error>;
    fn save(&mut self, store: &PresetStore) -> Result<(), Self::Error>;
}
