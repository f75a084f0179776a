//! Unit tests for cached downloads.

use super::*;
use crate::fetch::source::MockReleaseSource;
use rstest::rstest;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

const URL: &str = "https://dist.example/lucene/lucene-5.1.0.tgz";
const NAME: &str = "lucene-5.1.0.tgz";

/// Reader that yields some bytes and then fails, like a dropped connection.
struct BrokenStream {
    sent: bool,
}

impl Read for BrokenStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.sent {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ));
        }
        self.sent = true;
        let chunk = b"partial";
        buf[..chunk.len()].copy_from_slice(chunk);
        Ok(chunk.len())
    }
}

fn ok_stream(bytes: &'static [u8]) -> Box<dyn Read + Send> {
    Box::new(Cursor::new(bytes))
}

fn only_file(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[rstest]
fn fetch_writes_stream_into_place() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut source = MockReleaseSource::new();
    source
        .expect_open()
        .times(1)
        .returning(|_| Ok(ok_stream(b"release bytes")));

    let fetcher = Fetcher::new(&source, CachePolicy::ForceClean);
    let path = fetcher.fetch(NAME, URL, dir.path()).expect("fetch");

    assert_eq!(std::fs::read(&path).expect("read"), b"release bytes");
    assert_eq!(only_file(dir.path()), vec![NAME]);
}

#[rstest]
fn fetch_retries_once_and_leaves_no_partial_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calls = AtomicUsize::new(0);
    let mut source = MockReleaseSource::new();
    source.expect_open().times(2).returning(move |_| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(Box::new(BrokenStream { sent: false }))
        } else {
            Ok(ok_stream(b"complete"))
        }
    });

    let fetcher = Fetcher::new(&source, CachePolicy::ForceClean);
    let path = fetcher.fetch(NAME, URL, dir.path()).expect("second attempt succeeds");

    assert_eq!(std::fs::read(&path).expect("read"), b"complete");
    assert_eq!(only_file(dir.path()), vec![NAME]);
}

#[rstest]
fn fetch_fails_after_second_failure_naming_url() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut source = MockReleaseSource::new();
    source
        .expect_open()
        .times(2)
        .returning(|_| Ok(Box::new(BrokenStream { sent: false })));

    let fetcher = Fetcher::new(&source, CachePolicy::ForceClean);
    let err = fetcher
        .fetch(NAME, URL, dir.path())
        .expect_err("both attempts fail");

    assert!(matches!(err, FetchError::Download { ref url, .. } if url == URL));
    assert!(only_file(dir.path()).is_empty(), "partial files must be removed");
}

#[rstest]
fn fetch_retries_missing_resources_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut source = MockReleaseSource::new();
    source.expect_open().times(2).returning(|url| {
        Err(FetchError::NotFound {
            url: url.to_owned(),
        })
    });

    let fetcher = Fetcher::new(&source, CachePolicy::ForceClean);
    assert!(matches!(
        fetcher.fetch(NAME, URL, dir.path()),
        Err(FetchError::NotFound { ref url }) if url == URL
    ));
}

#[rstest]
fn fetch_recovers_when_a_missing_resource_appears() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calls = AtomicUsize::new(0);
    let mut source = MockReleaseSource::new();
    source.expect_open().times(2).returning(move |url| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(FetchError::NotFound {
                url: url.to_owned(),
            })
        } else {
            Ok(ok_stream(b"late mirror"))
        }
    });

    let fetcher = Fetcher::new(&source, CachePolicy::ForceClean);
    let path = fetcher.fetch(NAME, URL, dir.path()).expect("second attempt succeeds");
    assert_eq!(std::fs::read(path).expect("read"), b"late mirror");
}

#[rstest]
#[case::force_clean(CachePolicy::ForceClean, 1, b"fresh".as_slice())]
#[case::reuse(CachePolicy::Reuse, 0, b"cached".as_slice())]
fn cache_policy_controls_refetch(
    #[case] policy: CachePolicy,
    #[case] expected_opens: usize,
    #[case] expected: &[u8],
) {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(NAME), b"cached").expect("seed cache");
    let mut source = MockReleaseSource::new();
    source
        .expect_open()
        .times(expected_opens)
        .returning(|_| Ok(ok_stream(b"fresh")));

    let fetcher = Fetcher::new(&source, policy);
    let path = fetcher.fetch(NAME, URL, dir.path()).expect("fetch");

    assert_eq!(std::fs::read(path).expect("read"), expected);
}

#[rstest]
fn copy_chunked_handles_inputs_larger_than_one_chunk() {
    let data = vec![7u8; DOWNLOAD_CHUNK * 2 + 13];
    let mut out = Vec::new();
    let copied = copy_chunked(&mut Cursor::new(data.clone()), &mut out).expect("copy");
    assert_eq!(copied, data.len() as u64);
    assert_eq!(out, data);
}
