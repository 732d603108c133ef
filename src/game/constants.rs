/// Grid dimensions - must match the server's grid or every bounds check drifts
pub mod grid {
    /// Default number of columns (x range is 0..COLS)
    pub const COLS: i32 = 40;
    /// Default number of rows (y range is 0..ROWS)
    pub const ROWS: i32 = 30;
    /// Upper bound accepted from configuration for either dimension
    pub const MAX_DIMENSION: i32 = 1024;
}

/// Worm growth constants
pub mod growth {
    /// Food required per segment of current length before growing by one
    pub const LEVEL_MULTIPLIER: u32 = 2;

    /// Food needed for a worm of `length` segments to grow. Saturates at `u32::MAX`.
    #[inline]
    pub const fn food_needed(length: usize, multiplier: u32) -> u32 {
        let length = if length > u32::MAX as usize { u32::MAX } else { length as u32 };
        length.saturating_mul(multiplier)
    }
}

/// Bomb timer constants
pub mod bomb {
    use std::time::Duration;

    /// Cosmetic countdown period (one tick per whole second)
    pub const COUNTDOWN_INTERVAL: Duration = Duration::from_secs(1);
    /// Typical blast range is a square of radius <= 2, so 25 cells fit inline
    pub const INLINE_BLAST_CELLS: usize = 25;
}

/// Network/session constants
pub mod net {
    /// Default game server WebSocket endpoint
    pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8001";
    /// Capacity of the inbound transport event queue
    pub const INBOUND_QUEUE_CAPACITY: usize = 256;
    /// Capacity of the local input (direction) queue
    pub const INPUT_QUEUE_CAPACITY: usize = 64;
}
