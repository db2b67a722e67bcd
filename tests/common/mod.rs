#![allow(dead_code)]

use fragbox::config::SandboxConfig;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::OnceLock;

// Stand-in for the container runtime client. Every call is appended to
// calls.log next to the script. For `run`, behaviour is picked by the image
// argument (the word right before the entry command).
const FAKE_RUNTIME: &str = r#"#!/bin/sh
dir=$(dirname "$0")
echo "$*" >> "$dir/calls.log"
[ "$1" = run ] || exit 0
image=""
prev=""
for arg in "$@"; do
  case "$arg" in
    python|/bin/sh) image="$prev"; break ;;
  esac
  prev="$arg"
done
case "$image" in
  exit-*) cat >/dev/null; exit "${image#exit-}" ;;
  echo) exec cat ;;
  stderr) cat >&2; exit 0 ;;
  sleep) exec sleep 30 ;;
  ignore-input) exit 5 ;;
  *) echo "unknown image: $image" >&2; exit 99 ;;
esac
"#;

static RUNTIME_DIR: OnceLock<tempfile::TempDir> = OnceLock::new();

/// Path to the fake runtime, written once per test binary.
pub fn fake_runtime() -> PathBuf {
    let dir = RUNTIME_DIR.get_or_init(|| {
        let dir = tempfile::Builder::new()
            .prefix("fragbox-runtime")
            .tempdir()
            .expect("create runtime dir");
        let script = dir.path().join("docker");
        std::fs::write(&script, FAKE_RUNTIME).expect("write fake runtime");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod fake runtime");
        dir
    });
    dir.path().join("docker")
}

/// Everything the fake runtime has been asked to do so far.
pub fn calls() -> String {
    let log = fake_runtime().with_file_name("calls.log");
    std::fs::read_to_string(log).unwrap_or_default()
}

/// Config pointing at the fake runtime, with `image` for both backends.
pub fn config(image: &str) -> SandboxConfig {
    SandboxConfig {
        runtime: fake_runtime().to_string_lossy().into_owned(),
        interpreted_image: image.to_string(),
        emulated_image: image.to_string(),
        deadline_ms: 5_000,
        ..SandboxConfig::default()
    }
}
