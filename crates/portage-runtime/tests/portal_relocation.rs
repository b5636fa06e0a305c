#![forbid(unsafe_code)]

//! Portal relocation through the presentation context: buffering,
//! on-demand targets, unregistration and unmount cleanup.

use portage_core::{NodeId, TargetId};
use portage_harness::{HostCall, Scenario};
use portage_runtime::{Error, Owner, RegistrationOrigin, Visibility};

const SOURCE: NodeId = NodeId::new(10);
const OTHER_SOURCE: NodeId = NodeId::new(20);
const TARGET_NODE: NodeId = NodeId::new(30);
const C1: NodeId = NodeId::new(11);
const C2: NodeId = NodeId::new(12);
const X: NodeId = NodeId::new(21);

fn toolbar() -> TargetId {
    TargetId::new("toolbar")
}

fn assert_mirror_matches(sc: &Scenario, nodes: &[NodeId]) {
    for node in nodes {
        assert_eq!(
            sc.host().mirrored_owner(*node),
            sc.ctx().current_owner(*node),
            "host mirror diverged for {node}"
        );
    }
}

#[test]
fn buffered_content_flushes_in_submission_order() {
    let mut sc = Scenario::default();
    let err = sc.mount_source(SOURCE, "toolbar", false, &[C1, C2]).unwrap_err();
    match err {
        Error::UnknownTarget(e) => {
            assert_eq!(e.target, toolbar());
            assert_eq!(e.buffered, 2);
        }
        other => panic!("expected UnknownTarget, got {other:?}"),
    }
    assert_eq!(sc.ctx().registry().buffered(sc.ctx().ledger(), &toolbar()), &[C1, C2]);
    assert_eq!(sc.ctx().ledger().visibility(C1), Some(Visibility::Hidden));

    sc.mount_target(TARGET_NODE, "toolbar", false).unwrap();
    let ctx = sc.ctx();
    assert_eq!(ctx.registry().host_children(ctx.ledger(), &toolbar()), &[C1, C2]);
    assert!(ctx.registry().buffered(ctx.ledger(), &toolbar()).is_empty());
    assert_eq!(ctx.ledger().visibility(C2), Some(Visibility::Visible));
    assert!(sc.host().calls().contains(&HostCall::TargetRegistered(toolbar())));
    assert_mirror_matches(&sc, &[C1, C2]);
}

#[test]
fn create_on_demand_registers_target() {
    let mut sc = Scenario::default();
    sc.mount_source(SOURCE, "toolbar", true, &[C1]).unwrap();

    let registration = sc.ctx().registry().registration(&toolbar()).cloned().unwrap();
    assert_eq!(registration.origin, RegistrationOrigin::OnDemand);
    assert!(registration.create_on_demand);
    assert_eq!(sc.ctx().current_owner(C1), Some(&Owner::Target(toolbar())));

    // A declared target with the same name takes over the registration.
    sc.mount_target(TARGET_NODE, "toolbar", false).unwrap();
    let registration = sc.ctx().registry().registration(&toolbar()).cloned().unwrap();
    assert_eq!(registration.origin, RegistrationOrigin::Declared(TARGET_NODE));
    assert_eq!(sc.ctx().current_owner(C1), Some(&Owner::Target(toolbar())));
}

#[test]
fn registering_twice_keeps_handle() {
    let mut sc = Scenario::default();
    let first = sc.ctx_mut().register_target("toolbar", false).unwrap();
    let second = sc.ctx_mut().register_target("toolbar", false).unwrap();
    assert_eq!(first, second);
    let registered = sc
        .host()
        .calls()
        .iter()
        .filter(|c| matches!(c, HostCall::TargetRegistered(_)))
        .count();
    assert_eq!(registered, 1);
}

#[test]
fn unmounted_target_returns_content_home() {
    let mut sc = Scenario::default();
    sc.mount_target(TARGET_NODE, "toolbar", false).unwrap();
    sc.mount_source(SOURCE, "toolbar", false, &[C1, C2]).unwrap();
    assert_eq!(sc.ctx().current_owner(C1), Some(&Owner::Target(toolbar())));

    sc.ctx_mut().on_unmount(TARGET_NODE).unwrap();
    assert!(sc.ctx().registry().registration(&toolbar()).is_none());
    assert_eq!(sc.ctx().ledger().children(&Owner::Anchor(SOURCE)), &[C1, C2]);
    assert!(sc.host().calls().contains(&HostCall::TargetUnregistered(toolbar())));
    assert_mirror_matches(&sc, &[C1, C2]);
}

#[test]
fn on_demand_target_rebuffers_when_unregistered() {
    let mut sc = Scenario::default();
    sc.ctx_mut().register_target("toolbar", true).unwrap();
    sc.mount_source(SOURCE, "toolbar", true, &[C1, C2]).unwrap();
    sc.ctx_mut().mark(C2, "selection", "3..7").unwrap();
    let instance = sc.ctx().ledger().instance(C2);

    assert!(sc.ctx_mut().unregister_target(&toolbar()).unwrap());
    assert!(!sc.ctx_mut().unregister_target(&toolbar()).unwrap());
    assert_eq!(sc.ctx().registry().buffered(sc.ctx().ledger(), &toolbar()), &[C1, C2]);

    sc.ctx_mut().register_target("toolbar", true).unwrap();
    let ctx = sc.ctx();
    assert_eq!(ctx.registry().host_children(ctx.ledger(), &toolbar()), &[C1, C2]);
    assert_eq!(ctx.ledger().read(C2, "selection"), Some("3..7"));
    assert_eq!(ctx.ledger().instance(C2), instance);
}

#[test]
fn resubmission_reorders_and_drops() {
    let mut sc = Scenario::default();
    sc.mount_target(TARGET_NODE, "toolbar", false).unwrap();
    sc.mount_source(SOURCE, "toolbar", false, &[C1, C2]).unwrap();

    sc.ctx_mut().on_children_changed(SOURCE, &[C2, C1]).unwrap();
    let ctx = sc.ctx();
    assert_eq!(ctx.registry().host_children(ctx.ledger(), &toolbar()), &[C2, C1]);

    sc.ctx_mut().on_children_changed(SOURCE, &[C2]).unwrap();
    let ctx = sc.ctx();
    assert_eq!(ctx.registry().host_children(ctx.ledger(), &toolbar()), &[C2]);
    assert_eq!(ctx.current_owner(C1), Some(&Owner::Anchor(SOURCE)));
    assert_mirror_matches(&sc, &[C1, C2]);
}

#[test]
fn sources_share_a_target() {
    let mut sc = Scenario::default();
    sc.mount_target(TARGET_NODE, "toolbar", false).unwrap();
    sc.mount_source(SOURCE, "toolbar", false, &[C1]).unwrap();
    sc.mount_source(OTHER_SOURCE, "toolbar", false, &[X]).unwrap();
    let ctx = sc.ctx();
    assert_eq!(ctx.registry().host_children(ctx.ledger(), &toolbar()), &[C1, X]);

    sc.ctx_mut().release_content(&toolbar(), Some(SOURCE)).unwrap();
    let ctx = sc.ctx();
    assert_eq!(ctx.registry().host_children(ctx.ledger(), &toolbar()), &[X]);
    assert_eq!(ctx.current_owner(C1), Some(&Owner::Anchor(SOURCE)));
}

#[test]
fn unmounted_source_releases_content() {
    let mut sc = Scenario::default();
    sc.mount_target(TARGET_NODE, "toolbar", false).unwrap();
    sc.mount_source(SOURCE, "toolbar", false, &[C1, C2]).unwrap();

    sc.ctx_mut().on_unmount(SOURCE).unwrap();
    let ctx = sc.ctx();
    assert!(ctx.registry().host_children(ctx.ledger(), &toolbar()).is_empty());
    assert!(ctx.registry().relocated(C1).is_none());
    assert_eq!(ctx.current_owner(C2), Some(&Owner::Anchor(SOURCE)));
}

#[test]
fn unmounted_relocated_node_is_detached() {
    let mut sc = Scenario::default();
    sc.mount_target(TARGET_NODE, "toolbar", false).unwrap();
    sc.mount_source(SOURCE, "toolbar", false, &[C1, C2]).unwrap();

    sc.ctx_mut().on_unmount(C1).unwrap();
    let ctx = sc.ctx();
    assert!(!ctx.ledger().contains(C1));
    assert!(ctx.registry().relocated(C1).is_none());
    assert_eq!(ctx.registry().host_children(ctx.ledger(), &toolbar()), &[C2]);
    assert!(sc.host().calls().contains(&HostCall::Detach(C1)));
    assert_eq!(sc.host().mirrored_owner(C1), None);
}

#[test]
fn submitting_untracked_node_is_rejected() {
    let mut sc = Scenario::default();
    sc.mount_target(TARGET_NODE, "toolbar", false).unwrap();
    let err = sc
        .ctx_mut()
        .submit_content(&toolbar(), SOURCE, &[NodeId::new(999)], false)
        .unwrap_err();
    assert!(matches!(err, Error::Ledger(_)));
}
