#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable stand-in for the clustering tool. It accepts the real
/// tool's flags, places every input sequence in its own cluster, and appends
/// a line to `counter` on each invocation.
pub fn write_stub_tool(dir: &Path, counter: &Path) -> PathBuf {
    let script = dir.join("stub-vsearch.sh");
    let body = format!(
        r#"#!/bin/sh
set -eu
input=""
centroids=""
uc=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --cluster_fast) input="$2"; shift 2 ;;
    --centroids) centroids="$2"; shift 2 ;;
    --uc) uc="$2"; shift 2 ;;
    --id|--threads) shift 2 ;;
    *) shift ;;
  esac
done
echo "$input" >> "{counter}"
cp "$input" "$centroids"
: > "$uc"
cluster=0
grep '^>' "$input" | sed 's/^>//' | while IFS= read -r gene; do
  printf 'S\t%s\t1\t*\t*\t*\t*\t*\t%s\t*\n' "$cluster" "$gene" >> "$uc"
  cluster=$((cluster+1))
done
"#,
        counter = counter.display()
    );
    write_executable(&script, &body);
    script
}

/// A tool that writes a partial centroid file and then fails.
pub fn write_failing_tool(dir: &Path) -> PathBuf {
    let script = dir.join("failing-vsearch.sh");
    let body = r#"#!/bin/sh
centroids=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --centroids) centroids="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf '>truncated\n' > "$centroids"
echo "simulated clustering failure" >&2
exit 1
"#;
    write_executable(&script, body);
    script
}

pub fn write_executable(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

pub fn invocation_count(counter: &Path) -> usize {
    match fs::read_to_string(counter) {
        Ok(text) => text.lines().count(),
        Err(_) => 0,
    }
}
