/// Bytes in one MiB, the unit throughput is reported in.
pub const MIB: f64 = 1024.0 * 1024.0;

/// Client buffers repeat the byte sequence `0..PATTERN_PERIOD`.
pub const PATTERN_PERIOD: usize = 128;

/// Largest block a single io_uring read or write can describe.
pub const MAX_BLOCK_SIZE: usize = u32::MAX as usize;
