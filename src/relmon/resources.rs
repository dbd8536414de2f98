/// Disk reserved per item, enough for the ROOT file plus its share of the report.
pub const DISK_PER_ITEM_MIB: u64 = 300;

/// HTCondor resource request for one RelMon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resources {
    pub cpus: u32,
    pub memory_gib: u32,
    pub disk_mib: u64,
}

impl Resources {
    /// Step function over the number of items still waiting to be compared.
    pub fn for_item_count(items: usize) -> Self {
        let cpus = match items {
            0..=10 => 1,
            11..=30 => 2,
            31..=90 => 4,
            91..=180 => 8,
            _ => 16,
        };

        Self {
            cpus,
            memory_gib: cpus * 2,
            disk_mib: items.max(1) as u64 * DISK_PER_ITEM_MIB,
        }
    }

    /// `request_memory` value, e.g. `4G`.
    pub fn memory(&self) -> String {
        format!("{}G", self.memory_gib)
    }

    /// `request_disk` value, e.g. `600M`.
    pub fn disk(&self) -> String {
        format!("{}M", self.disk_mib)
    }
}
