use std::process::Command;

/// `git describe`, or the crate version outside a checkout (e.g. a source tarball).
fn describe() -> String {
    let pkg = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    match Command::new("git")
        .args(["describe", "--always", "--dirty", "--tags"])
        .output()
    {
        Ok(o) if o.status.success() => {
            format!("{} ({})", pkg, String::from_utf8_lossy(&o.stdout).trim())
        }
        _ => pkg,
    }
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
    println!("cargo:rustc-env=GIT_VERSION={}", describe());
}
