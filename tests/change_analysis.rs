// tests/change_analysis.rs

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use sentinel::cache::TestResultCache;
use sentinel::cache::change::ChangeType;
use sentinel::engine::targets::dirs_for_change;
use sentinel::errors::SentinelError;
use sentinel::fs::mock::MockFileSystem;
use sentinel::results::{TestResult as CaseResult, TestStatus, TestSuite};
use sentinel::types::WatchMode;
use sentinel::watch::{FixedClock, TestFileFinder};

type TestResult = Result<(), Box<dyn Error>>;

const MATH_TEST: &str = r#"package math

func TestAdd(t *testing.T) {}

func TestMain(m *testing.M) {}

func TestSub(t *testing.T) {
	t.Run("negative", func(t *testing.T) {})
}
"#;

fn setup() -> (MockFileSystem, FixedClock, TestResultCache) {
    let fs = MockFileSystem::with_cwd("/repo");
    fs.add_file("math/add.go", "package math\n");
    fs.add_file("math/add_test.go", MATH_TEST);
    fs.add_file("math/extra_test.go", "package math\n\nfunc TestExtra(t *testing.T) {}\n");
    fs.add_file("math/orphan.go", "package math\n");
    fs.add_file("README.md", "# repo\n");
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());
    let cache = TestResultCache::new(Arc::new(fs.clone()), Arc::new(clock.clone()));
    (fs, clock, cache)
}

#[test]
fn implementation_change_lists_paired_tests() -> TestResult {
    let (_fs, _clock, cache) = setup();

    let change = cache.analyze_change("/repo/math/add.go")?;
    assert_eq!(change.change_type, ChangeType::Implementation);
    assert!(change.is_new);
    assert_eq!(change.affected_tests, vec!["TestAdd", "TestSub"]);
    assert!(change.content_hash.is_some());
    Ok(())
}

#[test]
fn test_and_other_changes() -> TestResult {
    let (_fs, _clock, cache) = setup();

    let test = cache.analyze_change("/repo/math/extra_test.go")?;
    assert_eq!(test.change_type, ChangeType::Test);
    assert_eq!(test.affected_tests, vec!["TestExtra"]);

    let orphan = cache.analyze_change("/repo/math/orphan.go")?;
    assert_eq!(orphan.change_type, ChangeType::Implementation);
    assert!(orphan.affected_tests.is_empty());

    let other = cache.analyze_change("/repo/README.md")?;
    assert_eq!(other.change_type, ChangeType::Other);

    assert!(matches!(
        cache.analyze_change(""),
        Err(SentinelError::Config(_))
    ));
    Ok(())
}

#[test]
fn cached_results_mark_changes_as_seen() -> TestResult {
    let (_fs, clock, mut cache) = setup();

    let mut suite = TestSuite::new("math");
    let mut case = CaseResult::new("math", "TestAdd");
    case.status = TestStatus::Passed;
    suite.tests.push(case);

    cache.cache_result("/repo/math/add.go", suite.clone());
    clock.advance(Duration::seconds(30));
    cache.cache_result("/repo/math/orphan.go", suite);

    assert!(!cache.analyze_change("/repo/math/add.go")?.is_new);
    let stats = cache.get_stats();
    assert_eq!(stats.cached_results, 2);
    assert_eq!(stats.tracked_tests, 2);
    assert_eq!(stats.newest.zip(stats.oldest).map(|(n, o)| n - o), Some(Duration::seconds(30)));

    cache.clear();
    assert!(cache.get_cached_result("/repo/math/add.go").is_none());
    assert_eq!(cache.get_stats().cached_results, 0);
    Ok(())
}

#[test]
fn modes_choose_different_packages() {
    let (fs, _clock, _cache) = setup();
    fs.add_file("calc/calc_test.go", "package calc\n");
    let finder = TestFileFinder::new(Arc::new(fs));

    let file = Path::new("/repo/math/orphan.go");
    assert_eq!(
        dirs_for_change(WatchMode::Changed, &finder, file),
        vec![PathBuf::from("/repo/math")]
    );
    assert_eq!(
        dirs_for_change(WatchMode::Related, &finder, file),
        vec![PathBuf::from("/repo/math")]
    );
    assert!(dirs_for_change(WatchMode::All, &finder, file).is_empty());
}

#[test]
fn test_file_becomes_known_after_caching() -> TestResult {
    let (_fs, _clock, mut cache) = setup();

    let first = cache.analyze_change("/repo/math/add_test.go")?;
    assert_eq!(first.change_type, ChangeType::Test);
    assert!(first.is_new);
    assert_eq!(first.affected_tests, vec!["TestAdd", "TestSub"]);

    cache.cache_result("/repo/math/add_test.go", TestSuite::new("math"));
    assert!(!cache.analyze_change("/repo/math/add_test.go")?.is_new);
    Ok(())
}
