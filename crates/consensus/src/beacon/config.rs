//! Built-in network configurations: genesis roots, fork schedules, and the
//! fork-dependent generalized indices for light-client branches.

use {
    super::types::{SLOTS_PER_EPOCH, epoch_at_slot},
    alloy_primitives::{B256, b256},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Sepolia,
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Self::Mainnet),
            "sepolia" => Ok(Self::Sepolia),
            other => Err(format!("unknown beacon network {other:?}")),
        }
    }
}

/// Fork activation epochs and versions for one network.
#[derive(Debug, Clone)]
pub struct ForkSchedule {
    pub genesis_validators_root: B256,
    /// `(activation_epoch, fork_version)`, ascending by epoch.
    forks: Vec<(u64, [u8; 4])>,
    electra_epoch: u64,
}

impl ForkSchedule {
    /// Fork version in force at `epoch`.
    pub fn fork_version_at(&self, epoch: u64) -> [u8; 4] {
        self.forks
            .iter()
            .rev()
            .find(|(activation, _)| *activation <= epoch)
            .map(|(_, version)| *version)
            .unwrap_or(self.forks[0].1)
    }

    /// Fork version for the signature over a header signed at
    /// `signature_slot` (the fork of the previous slot's epoch).
    pub fn fork_version_for_signature(&self, signature_slot: u64) -> [u8; 4] {
        self.fork_version_at(epoch_at_slot(signature_slot.max(1) - 1))
    }

    pub fn is_electra(&self, epoch: u64) -> bool {
        epoch >= self.electra_epoch
    }

    /// Branch positions for the light-client proofs at `slot`.
    pub fn branch_indices_at(&self, slot: u64) -> BranchIndices {
        if self.is_electra(slot / SLOTS_PER_EPOCH) {
            BranchIndices::ELECTRA
        } else {
            BranchIndices::ALTAIR
        }
    }
}

/// `(depth, index)` pairs derived from the generalized indices of the
/// beacon-state fields the branches commit to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchIndices {
    pub current_sync_committee: (u32, u64),
    pub next_sync_committee: (u32, u64),
    pub finalized_root: (u32, u64),
    /// Execution payload inside the light-client header body; fork
    /// independent since Capella.
    pub execution_payload: (u32, u64),
}

impl BranchIndices {
    /// Altair through Deneb: gindices 54 / 55 / 105.
    pub const ALTAIR: Self = Self {
        current_sync_committee: (5, 22),
        next_sync_committee: (5, 23),
        finalized_root: (6, 41),
        execution_payload: (4, 9),
    };

    /// Electra grew the beacon state: gindices 86 / 87 / 169.
    pub const ELECTRA: Self = Self {
        current_sync_committee: (6, 22),
        next_sync_committee: (6, 23),
        finalized_root: (7, 41),
        execution_payload: (4, 9),
    };
}

impl Network {
    pub fn schedule(self) -> ForkSchedule {
        match self {
            Self::Mainnet => ForkSchedule {
                genesis_validators_root: b256!(
                    "4b363db94e286120d76eb905340fdd4e54bfe9f06bf33ff6cf5ad27f511bfe95"
                ),
                forks: vec![
                    (0, [0x00, 0x00, 0x00, 0x00]),
                    (74_240, [0x01, 0x00, 0x00, 0x00]),
                    (144_896, [0x02, 0x00, 0x00, 0x00]),
                    (194_048, [0x03, 0x00, 0x00, 0x00]),
                    (269_568, [0x04, 0x00, 0x00, 0x00]),
                    (364_032, [0x05, 0x00, 0x00, 0x00]),
                ],
                electra_epoch: 364_032,
            },
            Self::Sepolia => ForkSchedule {
                genesis_validators_root: b256!(
                    "d8ea171f3c94aea21ebc42a1ed61052acf3f9209c00e4efbaaddac09ed9b8078"
                ),
                forks: vec![
                    (0, [0x90, 0x00, 0x00, 0x69]),
                    (50, [0x90, 0x00, 0x00, 0x70]),
                    (100, [0x90, 0x00, 0x00, 0x71]),
                    (56_832, [0x90, 0x00, 0x00, 0x72]),
                    (132_608, [0x90, 0x00, 0x00, 0x73]),
                    (222_464, [0x90, 0x00, 0x00, 0x74]),
                ],
                electra_epoch: 222_464,
            },
        }
    }
}
