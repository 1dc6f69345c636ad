use serde::Serialize;
use sysinfo::System;

/// Snapshot of resource usage, for operator surfaces and logs.
#[derive(Serialize, Debug, Clone, Copy)]
pub struct ResourceStats {
    pub workspace_size_bytes: u64,
    pub workspace_limit_bytes: u64,
    pub memory_used_percent: f32,
    pub memory_free_percent: f32,
    pub memory_available_bytes: u64,
}

/// Fraction of system memory currently free, as a percentage.
pub(crate) fn free_memory_percent() -> f32 {
    let mut system = System::new();
    system.refresh_memory();
    let total = system.total_memory();
    if total == 0 {
        return 100.0;
    }
    (system.available_memory() as f32 / total as f32) * 100.0
}

pub(crate) fn resource_stats(workspace_size: u64, workspace_limit: u64) -> ResourceStats {
    let mut system = System::new();
    system.refresh_memory();
    let total = system.total_memory();
    let available = system.available_memory();
    let free_percent = if total == 0 {
        100.0
    } else {
        (available as f32 / total as f32) * 100.0
    };

    ResourceStats {
        workspace_size_bytes: workspace_size,
        workspace_limit_bytes: workspace_limit,
        memory_used_percent: 100.0 - free_percent,
        memory_free_percent: free_percent,
        memory_available_bytes: available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_memory_percent_in_range() {
        let free = free_memory_percent();
        assert!((0.0..=100.0).contains(&free));
    }
}
