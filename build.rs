use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");

    enforce_pure_objective_boundary();
}

fn enforce_pure_objective_boundary() {
    // Objective modules do no I/O and print nothing; data loading and the
    // optimizer driver live outside this crate.
    let forbidden = [
        "std::fs",
        "std::net",
        "std::process",
        "std::io::stdin",
        "println!",
        "eprintln!",
        "dbg!(",
    ];

    let mut violations = Vec::new();
    let mut stack = vec![PathBuf::from("src")];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if path.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let src = match fs::read_to_string(&path) {
                Ok(s) => s,
                Err(_) => continue,
            };
            for (line_no, line) in src.lines().enumerate() {
                for token in &forbidden {
                    if line.contains(token) {
                        violations.push(format!(
                            "{}:{} contains forbidden token '{}'",
                            path.display(),
                            line_no + 1,
                            token
                        ));
                    }
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nerror: I/O or driver code found in objective modules:");
        for v in violations {
            eprintln!("  - {v}");
        }
        panic!("objective modules must stay free of I/O");
    }
}
