// tests/reconcile.rs

//! Tree reconciliation against a live installation.

mod common;

use common::{marker_files, write_tree};
use filetime::FileTime;
use rpcs3_updater::{ReconcileError, Reconciler};
use std::fs;
use std::path::Path;

const NEW_BUILD: &[(&str, &[u8])] = &[
    ("rpcs3", b"rpcs3 build 2"),
    ("lib/libavcodec.so.60", b"codec"),
    ("lib/libQt6Core.so.6", b"qt core 6.7"),
    ("GuiConfigs/Darker Style by TheMitoSan.qss", b"style"),
];

fn new_build(root: &Path) {
    write_tree(root, NEW_BUILD);
}

#[test]
fn test_second_pass_swaps_nothing() {
    let install = tempfile::tempdir().unwrap();
    write_tree(
        install.path(),
        &[("rpcs3", b"rpcs3 build 1"), ("lib/libavcodec.so.60", b"codec")],
    );

    let first = tempfile::tempdir().unwrap();
    new_build(first.path());
    let report = Reconciler::default()
        .reconcile(first.path(), install.path())
        .unwrap();
    assert_eq!(report.swapped_files, 3);
    assert_eq!(report.unchanged_files, 1);

    // The same build extracted again
    let second = tempfile::tempdir().unwrap();
    new_build(second.path());
    let report = Reconciler::default()
        .reconcile(second.path(), install.path())
        .unwrap();

    assert_eq!(report.swapped_files, 0);
    assert_eq!(report.created_directories, 0);
    assert_eq!(report.unchanged_files, NEW_BUILD.len());
    assert!(report.is_noop());
}

#[test]
fn test_identical_content_left_untouched() {
    let install = tempfile::tempdir().unwrap();
    let extracted = tempfile::tempdir().unwrap();
    write_tree(install.path(), &[("lib/libavcodec.so.60", b"codec")]);
    write_tree(extracted.path(), &[("lib/libavcodec.so.60", b"codec")]);

    let installed = install.path().join("lib/libavcodec.so.60");
    let old_time = FileTime::from_unix_time(1_000_000_000, 0);
    filetime::set_file_mtime(&installed, old_time).unwrap();

    let report = Reconciler::default()
        .reconcile(extracted.path(), install.path())
        .unwrap();

    assert_eq!(report.unchanged_files, 1);
    assert_eq!(report.swapped_files, 0);
    let mtime = FileTime::from_last_modification_time(&fs::metadata(&installed).unwrap());
    assert_eq!(mtime, old_time);
    assert!(marker_files(install.path()).is_empty());
}

#[test]
fn test_changed_file_renamed_aside_then_replaced() {
    let install = tempfile::tempdir().unwrap();
    let extracted = tempfile::tempdir().unwrap();
    write_tree(install.path(), &[("rpcs3", b"old bytes")]);
    write_tree(extracted.path(), &[("rpcs3", b"new bytes")]);

    Reconciler::default()
        .reconcile(extracted.path(), install.path())
        .unwrap();

    assert_eq!(
        fs::read(install.path().join("rpcs3.rpcs3-deprecated")).unwrap(),
        b"old bytes"
    );
    assert_eq!(fs::read(install.path().join("rpcs3")).unwrap(), b"new bytes");
}

#[test]
fn test_unrelated_installed_files_survive() {
    let install = tempfile::tempdir().unwrap();
    let extracted = tempfile::tempdir().unwrap();
    write_tree(
        install.path(),
        &[
            ("rpcs3", b"old"),
            ("dev_hdd0/home/00000001/savedata/save.bin", b"user save"),
            ("config.yml", b"user config"),
        ],
    );
    new_build(extracted.path());

    Reconciler::default()
        .reconcile(extracted.path(), install.path())
        .unwrap();

    assert_eq!(
        fs::read(install.path().join("dev_hdd0/home/00000001/savedata/save.bin")).unwrap(),
        b"user save"
    );
    assert_eq!(
        fs::read(install.path().join("config.yml")).unwrap(),
        b"user config"
    );
}

#[test]
fn test_directory_create_failure_aborts_before_any_swap() {
    let install = tempfile::tempdir().unwrap();
    let extracted = tempfile::tempdir().unwrap();

    // A file squats on the path where the new build needs a directory
    write_tree(
        install.path(),
        &[("a.txt", b"old a"), ("plugins", b"not a dir"), ("z.txt", b"old z")],
    );
    write_tree(
        extracted.path(),
        &[
            ("a.txt", b"new a"),
            ("plugins/audio.so", b"plugin"),
            ("z.txt", b"new z"),
        ],
    );

    let err = Reconciler::default()
        .reconcile(extracted.path(), install.path())
        .unwrap_err();

    match err {
        ReconcileError::DirectoryCreateFailed { path, .. } => {
            assert_eq!(path, install.path().join("plugins"));
        }
        other => panic!("expected DirectoryCreateFailed, got {other:?}"),
    }

    // Neither the file walked before the failure nor the sibling after it was swapped
    assert_eq!(fs::read(install.path().join("a.txt")).unwrap(), b"old a");
    assert_eq!(fs::read(install.path().join("z.txt")).unwrap(), b"old z");
    assert!(marker_files(install.path()).is_empty());
    assert!(extracted.path().join("a.txt").exists());
}

#[test]
fn test_nested_directories_created_parent_first() {
    let install = tempfile::tempdir().unwrap();
    let extracted = tempfile::tempdir().unwrap();
    write_tree(
        extracted.path(),
        &[("share/icons/hicolor/48x48/apps/rpcs3.png", b"png")],
    );

    let report = Reconciler::default()
        .reconcile(extracted.path(), install.path())
        .unwrap();

    assert_eq!(report.created_directories, 5);
    assert_eq!(
        fs::read(install.path().join("share/icons/hicolor/48x48/apps/rpcs3.png")).unwrap(),
        b"png"
    );
}
