//! Address-block parsing and CIDR coalescing
//!
//! Provides the network math behind access-control compilation:
//! - Individual IP addresses and CIDR ranges as one value type
//! - Subset tests and prefix masking
//! - Density-threshold coalescing of many narrow blocks into fewer CIDRs

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use tracing::warn;

/// A parsed IP address or CIDR range
///
/// The network address is stored masked to the prefix, so `10.1.2.3/8`
/// and `10.0.0.0/8` compare equal. A block parsed from a bare address
/// keeps its host form for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrBlock {
    network: IpAddr,
    prefix_len: u8,
    host: bool,
}

impl AddrBlock {
    /// Parse an address or CIDR string
    ///
    /// A bare address becomes a host block with a full-length prefix.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some((addr_str, prefix_str)) = s.split_once('/') {
            let addr = IpAddr::from_str(addr_str).ok()?;
            let prefix_len: u8 = prefix_str.parse().ok()?;

            if prefix_len > family_bits(&addr) {
                return None;
            }

            Some(Self {
                network: mask_addr(addr, prefix_len),
                prefix_len,
                host: false,
            })
        } else {
            let addr = IpAddr::from_str(s).ok()?;
            Some(Self {
                network: addr,
                prefix_len: family_bits(&addr),
                host: true,
            })
        }
    }

    /// A host block for a single known-good address
    pub fn host(addr: IpAddr) -> Self {
        Self {
            network: addr,
            prefix_len: family_bits(&addr),
            host: true,
        }
    }

    /// Network address, masked to the prefix
    pub fn network(&self) -> IpAddr {
        self.network
    }

    /// Prefix length in bits
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether this block was given as a bare address
    pub fn is_host(&self) -> bool {
        self.host
    }

    pub fn is_v4(&self) -> bool {
        self.network.is_ipv4()
    }

    /// Subset test: does this block cover all of `other`?
    pub fn contains(&self, other: &AddrBlock) -> bool {
        if self.is_v4() != other.is_v4() {
            return false;
        }
        if other.prefix_len < self.prefix_len {
            return false;
        }
        mask_addr(other.network, self.prefix_len) == self.network
    }

    /// The block widened (or kept) to `prefix_len`, in CIDR form
    fn masked(&self, prefix_len: u8) -> AddrBlock {
        AddrBlock {
            network: mask_addr(self.network, prefix_len),
            prefix_len,
            host: false,
        }
    }
}

impl fmt::Display for AddrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host {
            write!(f, "{}", self.network)
        } else {
            write!(f, "{}/{}", self.network, self.prefix_len)
        }
    }
}

fn family_bits(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask_addr(addr: IpAddr, prefix_len: u8) -> IpAddr {
    match addr {
        IpAddr::V4(a) => {
            let mask = if prefix_len == 0 {
                0
            } else {
                !0u32 << (32 - prefix_len)
            };
            IpAddr::V4(Ipv4Addr::from(u32::from(a) & mask))
        }
        IpAddr::V6(a) => {
            let mask = if prefix_len == 0 {
                0
            } else {
                !0u128 << (128 - prefix_len)
            };
            IpAddr::V6(Ipv6Addr::from(u128::from(a) & mask))
        }
    }
}

/// One candidate super-block accumulating its input members
struct Candidate {
    block: AddrBlock,
    sources: Vec<AddrBlock>,
}

/// Merge address blocks of one family into fewer, wider CIDRs
///
/// Blocks sharing a `target_prefix_len`-bit prefix are merged into one CIDR
/// once at least `min_members` inputs map to it; candidates below the
/// threshold emit their sources unchanged. The family is fixed by the first
/// block; inputs of the other family are skipped with a warning. For a fixed
/// input order the output order is fixed: candidates emit in creation order,
/// unmerged sources in attachment order.
pub fn coalesce(
    blocks: &[AddrBlock],
    min_members: usize,
    target_prefix_len: u8,
) -> (Vec<AddrBlock>, Vec<String>) {
    let mut warnings = Vec::new();
    let Some(first) = blocks.first() else {
        return (Vec::new(), warnings);
    };

    let v4 = first.is_v4();
    let target = target_prefix_len.min(if v4 { 32 } else { 128 });
    let min_members = min_members.max(1);

    let mut candidates: Vec<Candidate> = Vec::new();
    'blocks: for block in blocks {
        if block.is_v4() != v4 {
            warn!(block = %block, "address family mismatch, skipping");
            warnings.push(format!("address family mismatch for '{}', skipping", block));
            continue;
        }

        for i in 0..candidates.len() {
            if candidates[i].block.contains(block) {
                candidates[i].sources.push(*block);
                continue 'blocks;
            }
            if block.contains(&candidates[i].block) {
                // The new range is wider; widen the candidate to keep it a
                // superset of everything already attached.
                candidates[i].block = block.masked(block.prefix_len);
                candidates[i].sources.push(*block);
                continue 'blocks;
            }
        }

        // A range already wider than the target keeps its own mask.
        let candidate_len = target.min(block.prefix_len);
        candidates.push(Candidate {
            block: block.masked(candidate_len),
            sources: vec![*block],
        });
    }

    let mut merged = Vec::new();
    for candidate in candidates {
        if candidate.sources.len() >= min_members && candidate.sources.len() > 1 {
            merged.push(candidate.block);
        } else {
            merged.extend(candidate.sources);
        }
    }

    (merged, warnings)
}
