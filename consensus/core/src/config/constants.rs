/// Smallest units per coin
pub const COIN: u64 = 100_000_000;

/// Block reward before the first halving
pub const INITIAL_SUBSIDY: u64 = 50 * COIN;

/// Blocks between subsidy halvings
pub const HALVING_INTERVAL: u32 = 210_000;

/// Blocks between difficulty adjustments
pub const RETARGET_INTERVAL: u32 = 2016;

/// Seconds a retarget interval is expected to take (two weeks)
pub const TARGET_TIMESPAN: u64 = 14 * 24 * 60 * 60;

/// Easiest target on mainnet, in compact form
pub const MAINNET_HIGHEST_TARGET_BITS: u32 = 0x1d00ffff;

/// Easiest target on regtest, in compact form
pub const REGTEST_HIGHEST_TARGET_BITS: u32 = 0x207fffff;
