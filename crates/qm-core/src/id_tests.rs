// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn random_id_has_expected_shape() {
    let gen = RandomProjectIdGen;
    let id = gen.next();
    assert!(id.as_str().starts_with(ID_PREFIX));
    assert_eq!(id.as_str().len(), ID_PREFIX.len() + ID_HEX_LEN);
    assert!(id.as_str()[ID_PREFIX.len()..]
        .chars()
        .all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn random_ids_are_unique() {
    let gen = RandomProjectIdGen;
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
}

#[test]
fn sequential_ids_increment() {
    let gen = SequentialProjectIdGen::new();
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
    assert_eq!(a.as_str(), "proj-000000000000");
    assert_eq!(b.as_str(), "proj-000000000001");
}

#[test]
fn display_and_borrow() {
    let id = ProjectId::new("proj-abc123");
    assert_eq!(format!("{id}"), "proj-abc123");
    assert_eq!(id, "proj-abc123");
    let m: std::collections::HashMap<ProjectId, u32> =
        [(id.clone(), 1)].into_iter().collect();
    assert_eq!(m.get("proj-abc123"), Some(&1));
}
