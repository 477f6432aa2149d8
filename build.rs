use std::process::Command;
use std::fs;
use regex::Regex;

fn git_output(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|output| output.trim().to_string())
        .filter(|output| !output.is_empty())
        .unwrap_or_else(|| "undetermined".into())
}

fn main() {
    let git_hash = git_output(&["rev-parse", "HEAD"]);
    let git_count = git_output(&["rev-list", "--count", "HEAD"]);

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=GIT_COUNT={}", git_count);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=templates");

    if let Ok(head) = fs::read_to_string(".git/HEAD") {
        let re = Regex::new(r"ref: (.*)").expect("valid regex");
        if let Some(captures) = re.captures(&head) {
            println!("cargo:rerun-if-changed=.git/{}",
                     captures.get(1).map_or("", |m| m.as_str()));
        }
    }
}
