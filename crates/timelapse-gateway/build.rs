use std::process::Command;

/// `<crate version>+<short sha>`, or the bare crate version outside a git
/// checkout.
fn build_version() -> String {
    let pkg = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let head = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|sha| sha.trim().to_string())
        .filter(|sha| !sha.is_empty());
    match head {
        Some(sha) => format!("{pkg}+{sha}"),
        None => pkg,
    }
}

fn main() {
    println!("cargo:rustc-env=TIMELAPSE_BUILD_VERSION={}", build_version());
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}
