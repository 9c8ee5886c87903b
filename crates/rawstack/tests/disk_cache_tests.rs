mod common;

use {
    filetime::{set_file_mtime, FileTime},
    pretty_assertions::assert_eq,
    rawstack::{convert::trim_disk_cache, error::Error},
    std::path::Path,
};

/// One cached "file" in the trimmer's decimal accounting, scaled down so
/// the tests write kilobytes instead; budgets sit between file multiples
/// so the assertions do not ride on float rounding.
const FILE_SIZE: usize = 1000;
const FILE_SIZE_GB: f64 = FILE_SIZE as f64 / 1e9;

fn populate(dir: &Path, names: &[&str]) {
    for (age, name) in names.iter().enumerate() {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; FILE_SIZE]).unwrap();
        // chronological insertion order, oldest first
        set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000 + age as i64 * 60, 0)).unwrap();
    }
}

fn remaining(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn trim_deletes_oldest_first_until_under_budget() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), &["a.dng", "b.dng", "c.dng", "d.dng"]);

    trim_disk_cache(dir.path(), 2.5 * FILE_SIZE_GB).unwrap();
    assert_eq!(remaining(dir.path()), vec!["c.dng", "d.dng"]);
}

#[test]
fn trim_is_a_noop_under_budget() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), &["a.dng", "b.dng"]);

    trim_disk_cache(dir.path(), 10.0 * FILE_SIZE_GB).unwrap();
    assert_eq!(remaining(dir.path()), vec!["a.dng", "b.dng"]);
}

#[test]
fn zero_budget_clears_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), &["a.dng", "b.dng"]);

    trim_disk_cache(dir.path(), 0.0).unwrap();
    assert_eq!(remaining(dir.path()), Vec::<String>::new());
}

#[test]
fn trim_respects_chronology_not_names() {
    let dir = tempfile::tempdir().unwrap();
    // reverse-alphabetical insertion order: z is oldest
    populate(dir.path(), &["z.dng", "m.dng", "a.dng"]);

    trim_disk_cache(dir.path(), 2.5 * FILE_SIZE_GB).unwrap();
    assert_eq!(remaining(dir.path()), vec!["a.dng", "m.dng"]);
}

#[test]
fn total_size_is_bounded_after_trim() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), &["a.dng", "b.dng", "c.dng", "d.dng", "e.dng"]);

    trim_disk_cache(dir.path(), 3.5 * FILE_SIZE_GB).unwrap();
    let total: u64 = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().metadata().unwrap().len())
        .sum();
    assert!(total <= (3.5 * FILE_SIZE_GB * 1e9) as u64);
}

#[test]
fn missing_directory_is_a_cache_error() {
    let result = trim_disk_cache(Path::new("/nonexistent/cache"), 1.0);
    assert!(matches!(result, Err(Error::Cache { .. })));
}
