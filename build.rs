use std::process::Command;

const VERSION_ENV: &str = "SWIMLANE_VERSION";

fn strip_tag_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.strip_prefix('v') {
        Some(rest) if rest.starts_with(|ch: char| ch.is_ascii_digit()) => rest,
        _ => trimmed,
    }
}

fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn resolve_version() -> String {
    let from_env = std::env::var(VERSION_ENV)
        .ok()
        .map(|raw| strip_tag_prefix(&raw).to_string())
        .filter(|value| !value.is_empty());

    from_env
        .or_else(|| {
            git_output(&["describe", "--tags", "--always", "--dirty"])
                .map(|described| strip_tag_prefix(&described).to_string())
        })
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
}

fn main() {
    println!("cargo:rerun-if-env-changed={VERSION_ENV}");
    println!("cargo:rerun-if-changed=.git/HEAD");

    println!("cargo:rustc-env=SWIMLANE_BUILD_VERSION={}", resolve_version());
}
