#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use portage_core::{NodeId, SurfaceId, TargetId};
use portage_runtime::{Ledger, Owner};

#[derive(Debug, Arbitrary)]
enum OwnerSeed {
    Anchor(u8),
    Buffer(u8),
    Target(u8),
    Surface(u8),
}

impl OwnerSeed {
    fn owner(&self) -> Owner {
        match *self {
            Self::Anchor(n) => Owner::Anchor(NodeId::new(1_000 + u64::from(n % 4))),
            Self::Buffer(t) => Owner::Buffer(TargetId::new(format!("t{}", t % 3))),
            Self::Target(t) => Owner::Target(TargetId::new(format!("t{}", t % 3))),
            Self::Surface(s) => Owner::Surface(SurfaceId::new(u64::from(s % 3))),
        }
    }
}

#[derive(Debug, Arbitrary)]
enum LedgerOp {
    Adopt(u8, OwnerSeed),
    Reparent(u8, OwnerSeed),
    ReparentAt(u8, OwnerSeed, u8),
    ClaimedReparent(u8, OwnerSeed, OwnerSeed),
    Group(OwnerSeed, OwnerSeed),
    Reorder(OwnerSeed, Vec<u8>),
    Release(u8),
}

fn node(raw: u8) -> NodeId {
    NodeId::new(u64::from(raw % 32))
}

fuzz_target!(|ops: Vec<LedgerOp>| {
    let mut ledger = Ledger::new();

    for op in ops.iter().take(512) {
        match op {
            LedgerOp::Adopt(n, owner) => {
                let _ = ledger.adopt(node(*n), owner.owner());
            }
            LedgerOp::Reparent(n, to) => {
                if let Some(from) = ledger.current_owner(node(*n)).cloned() {
                    ledger.reparent(node(*n), &from, to.owner()).expect("reparent from actual owner");
                }
            }
            LedgerOp::ReparentAt(n, to, index) => {
                if let Some(from) = ledger.current_owner(node(*n)).cloned() {
                    let placement = ledger
                        .reparent_at(node(*n), &from, to.owner(), usize::from(*index))
                        .expect("reparent_at from actual owner");
                    assert_eq!(ledger.children(&placement.to).get(placement.index), Some(&placement.node));
                }
            }
            LedgerOp::ClaimedReparent(n, claimed, to) => {
                let before = ledger.current_owner(node(*n)).cloned();
                let result = ledger.reparent(node(*n), &claimed.owner(), to.owner());
                if result.is_err() {
                    assert_eq!(ledger.current_owner(node(*n)).cloned(), before, "failed move changed owner");
                }
            }
            LedgerOp::Group(from, to) => {
                let from = from.owner();
                let nodes = ledger.children(&from).to_vec();
                ledger.reparent_group(&nodes, &from, &to.owner()).expect("group from actual owner");
            }
            LedgerOp::Reorder(owner, order) => {
                let owner = owner.owner();
                let mut before = ledger.children(&owner).to_vec();
                let ordered: Vec<NodeId> = order.iter().map(|n| node(*n)).collect();
                ledger.reorder(&owner, &ordered);
                let mut after = ledger.children(&owner).to_vec();
                before.sort();
                after.sort();
                assert_eq!(before, after, "reorder changed membership");
            }
            LedgerOp::Release(n) => {
                let _ = ledger.release(node(*n));
            }
        }
    }

    // Every tracked node is listed exactly once, under its recorded owner.
    let mut listed = 0;
    for raw in 0..32u8 {
        let n = node(raw);
        if let Some(owner) = ledger.current_owner(n) {
            let count = ledger.children(owner).iter().filter(|c| **c == n).count();
            assert_eq!(count, 1, "node listed {count} times under its owner");
            listed += 1;
        }
    }
    assert_eq!(listed, ledger.len());
});
