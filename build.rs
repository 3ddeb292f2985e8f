use std::process::Command;

fn main() {
    // Reported by GET /health
    println!("cargo:rustc-env=UPO_BUILD_TIME={}", build_time());
    println!("cargo:rerun-if-changed=build.rs");
}

/// UTC timestamp from `date`, or "unknown" where it is unavailable.
fn build_time() -> String {
    Command::new("date")
        .args(["-u", "+%Y-%m-%dT%H:%M:%SZ"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
