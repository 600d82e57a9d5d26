/// Smallest P2WPKH output value relayed by default policy nodes
/// (3 sat/vB dust relay fee over the 98 vbyte spend + output cost).
pub const P2WPKH_DUST_LIMIT: u64 = 294;

/// Amount paid to the destination when no override is configured.
pub const DEFAULT_AMOUNT_TO_SEND: u64 = 1_000;

/// Fixed fee paid by every transaction built with the default configuration.
pub const DEFAULT_FEE: u64 = 200;
