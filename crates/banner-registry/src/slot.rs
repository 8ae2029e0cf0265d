//! Per-device slot table (spec 4.C): the fixed-capacity array of
//! `(slot -> active-message snapshot)` that owns "what is live" for one
//! device. Slot index 0 is the most visible by convention; lower indices
//! win display priority.

/// An empty slot is represented by `recno == 0`.
#[derive(Debug, Clone, Default)]
pub struct Slot {
    pub recno: i64,
    pub message_text: String,
}

impl Slot {
    fn is_populated(&self) -> bool {
        self.recno != 0
    }
}

#[derive(Debug)]
pub enum SlotError {
    OutOfRange { index: usize, capacity: usize },
}

impl std::fmt::Display for SlotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotError::OutOfRange { index, capacity } => {
                write!(f, "slot index {index} out of range (capacity {capacity})")
            }
        }
    }
}

impl std::error::Error for SlotError {}

#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    pub fn new(capacity: usize) -> Self {
        SlotTable {
            slots: vec![Slot::default(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn set(&mut self, index: usize, recno: i64, message_text: String) -> Result<(), SlotError> {
        let slot = self.slots.get_mut(index).ok_or(SlotError::OutOfRange {
            index,
            capacity: self.slots.len(),
        })?;
        slot.recno = recno;
        slot.message_text = message_text;
        Ok(())
    }

    pub fn clear(&mut self, index: usize) -> Result<(), SlotError> {
        let slot = self.slots.get_mut(index).ok_or(SlotError::OutOfRange {
            index,
            capacity: self.slots.len(),
        })?;
        *slot = Slot::default();
        Ok(())
    }

    pub fn clear_all(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::default();
        }
    }

    /// Clear every slot whose index is not in `keep`. Used by sequence-change
    /// and clear-sign handling, where the producer's sequence string is
    /// authoritative over which indices stay populated.
    pub fn clear_except(&mut self, keep: &[usize]) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if !keep.contains(&i) {
                *slot = Slot::default();
            }
        }
    }

    /// Ordered list of `(index, recno, message_text)` for every populated
    /// slot, in slot order.
    pub fn snapshot(&self) -> Vec<(usize, &Slot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_populated())
            .collect()
    }

    /// The set of `recno_zx` values currently populated, used to check the
    /// slot/journal agreement invariant.
    pub fn populated_recnos(&self) -> Vec<i64> {
        self.slots
            .iter()
            .filter(|s| s.is_populated())
            .map(|s| s.recno)
            .collect()
    }

    pub fn find_slot_for_recno(&self, recno: i64) -> Option<usize> {
        self.slots.iter().position(|s| s.recno == recno)
    }

    /// The lowest-index unpopulated slot, if any (spec 4.F: a new-message
    /// dispatch occupies the next free slot).
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| !s.is_populated())
    }
}
