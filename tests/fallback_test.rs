use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::new(cargo_bin!("iap-billing"));
    cmd.arg("--state-dir")
        .arg(dir.path())
        .args(["--store", "rocksdb", "purchase", "--product", "sku-1"]);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING: RocksDB storage requested via --store rocksdb, but 'storage-rocksdb' feature is not enabled. Falling back to JSON file storage."))
        .stdout(predicate::str::contains("outcome=Consumed"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::new(cargo_bin!("iap-billing"));
    cmd.arg("--state-dir")
        .arg(dir.path())
        .args(["--store", "rocksdb", "purchase", "--product", "sku-1"]);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
    assert!(dir.path().join("db").exists());
}
