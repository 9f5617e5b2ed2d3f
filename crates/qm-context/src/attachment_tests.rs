// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[tokio::test]
async fn write_then_read_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = DirAttachmentStore::new(dir.path());
    store.write("notes/todo.txt", b"hello").await.unwrap();
    assert_eq!(store.read("notes/todo.txt").await.unwrap(), b"hello");
    assert_eq!(store.list().await.unwrap(), vec!["notes/todo.txt".to_string()]);
}

#[tokio::test]
async fn read_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = DirAttachmentStore::new(dir.path());
    let err = store.read("missing.txt").await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn traversal_outside_root_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = DirAttachmentStore::new(dir.path());
    assert!(store.write("../escape.txt", b"x").await.is_err());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = DirAttachmentStore::new(dir.path());
    store.write("a.txt", b"x").await.unwrap();
    store.delete("a.txt").await.unwrap();
    store.delete("a.txt").await.unwrap();
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn fake_attachment_store_behaves_like_the_real_one() {
    let store = fake::FakeAttachmentStore::new();
    store.write("x.bin", b"data").await.unwrap();
    assert_eq!(store.read("x.bin").await.unwrap(), b"data");
}
