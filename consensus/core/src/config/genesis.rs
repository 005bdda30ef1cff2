use crate::config::constants::{MAINNET_HIGHEST_TARGET_BITS, REGTEST_HIGHEST_TARGET_BITS};
use crate::header::Header;
use crate::Hash;

/// Merkle root shared by the mainnet and regtest genesis blocks, display order
pub const GENESIS_MERKLE_ROOT: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

/// The constants uniquely representing a genesis header
#[derive(Clone, Copy, Debug)]
pub struct GenesisBlock {
    pub version: u32,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

pub const MAINNET_GENESIS: GenesisBlock =
    GenesisBlock { version: 1, time: 1231006505, bits: MAINNET_HIGHEST_TARGET_BITS, nonce: 2083236893 };

pub const REGTEST_GENESIS: GenesisBlock =
    GenesisBlock { version: 1, time: 1296688602, bits: REGTEST_HIGHEST_TARGET_BITS, nonce: 2 };

impl From<&GenesisBlock> for Header {
    fn from(genesis: &GenesisBlock) -> Self {
        let merkle_root = Hash::from_be_hex(GENESIS_MERKLE_ROOT).unwrap_or_default();
        Header::new(genesis.version, Hash::zeroed(), merkle_root, genesis.time, genesis.bits, genesis.nonce)
    }
}
