//! Event Flags
//!
//! Decodes the `eventFlags` bitmask carried by time-series events into the
//! five flags that govern how a sequence of records must be interpreted.
//!
//! | Bit    | Flag              | Meaning                                          |
//! |--------|-------------------|--------------------------------------------------|
//! | `0x01` | `TX_PENDING`      | a multi-event transaction is in progress         |
//! | `0x02` | `REMOVE_EVENT`    | the record with this index must be deleted       |
//! | `0x04` | `SNAPSHOT_BEGIN`  | a fresh snapshot load starts                     |
//! | `0x08` | `SNAPSHOT_END`    | snapshot complete, all data delivered            |
//! | `0x10` | `SNAPSHOT_SNIP`   | snapshot complete, truncated by a server limit   |

/// Pending transactional update spanning several events.
pub const TX_PENDING: u32 = 0x01;

/// The event with the corresponding index has to be removed.
pub const REMOVE_EVENT: u32 = 0x02;

/// Loading of a snapshot starts.
pub const SNAPSHOT_BEGIN: u32 = 0x04;

/// Snapshot ends with all data delivered.
pub const SNAPSHOT_END: u32 = 0x08;

/// Snapshot ends because a data limit was reached.
pub const SNAPSHOT_SNIP: u32 = 0x10;

/// Decoded event flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct EventFlags {
    /// An in-progress multi-event transaction.
    pub tx_pending: bool,
    /// The record must be deleted from any materialized view.
    pub should_be_removed: bool,
    /// Start of a fresh snapshot load.
    pub snapshot_begin: bool,
    /// Snapshot complete, full data delivered.
    pub snapshot_end: bool,
    /// Snapshot complete, truncated by a server-side limit.
    pub snapshot_snip: bool,
}

impl EventFlags {
    /// Decode a flag bitmask. Unknown bits are ignored.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            tx_pending: bits & TX_PENDING != 0,
            should_be_removed: bits & REMOVE_EVENT != 0,
            snapshot_begin: bits & SNAPSHOT_BEGIN != 0,
            snapshot_end: bits & SNAPSHOT_END != 0,
            snapshot_snip: bits & SNAPSHOT_SNIP != 0,
        }
    }

    /// Whether the snapshot phase is over, either complete or snipped.
    #[must_use]
    pub const fn snapshot_finished(&self) -> bool {
        self.snapshot_end || self.snapshot_snip
    }
}

impl From<u32> for EventFlags {
    fn from(bits: u32) -> Self {
        Self::from_bits(bits)
    }
}
