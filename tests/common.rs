use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Environment every CLI invocation under test gets: a bucket name plus a
/// pinned region and dummy credentials so the AWS SDK never probes the host.
pub const TEST_ENV: [(&str, &str); 4] = [
    ("SOURCE_BUCKET", "photos"),
    ("AWS_REGION", "us-east-1"),
    ("AWS_ACCESS_KEY_ID", "test"),
    ("AWS_SECRET_ACCESS_KEY", "test"),
];

/// A syntactically valid notification document with nothing to do.
pub fn empty_event_json() -> &'static str {
    r#"{ "Records": [] }"#
}

pub fn write_event_file(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("event.json");
    let mut file = File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
