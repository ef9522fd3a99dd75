//! Utility functions

/// Format byte size in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Percentage by which `output` is smaller than `input`
pub fn size_reduction_percent(input: u64, output: u64) -> f64 {
    if input == 0 {
        0.0
    } else {
        (1.0 - output as f64 / input as f64) * 100.0
    }
}
