//! Scratch cargo project the task runner builds in.
//!
//! Dependencies are declared inside the snippet itself with comment lines:
//!
//! ```text
//! //~ use regex
//! //~ use serde = "1.0"
//! ```

use std::path::Path;

use crate::{TaskError, TaskErrorKind};

pub const BIN_TARGET_NAME: &str = "playground";

const MANIFEST_HEAD: &str = r#"[package]
name = "playground"
version = "0.0.0"
edition = "2021"
publish = false

[dependencies]
"#;

/// Write `src/main.rs` and `Cargo.toml` under `dir`, creating it if needed.
pub async fn create_cargo_scaffold(dir: &Path, code: &str) -> Result<(), TaskError> {
    let deps = parse_dep_comments(code)?;

    let src_dir = dir.join("src");
    tokio::fs::create_dir_all(&src_dir)
        .await
        .map_err(|e| create_failed(&src_dir, e))?;

    let main_rs = src_dir.join("main.rs");
    tokio::fs::write(&main_rs, code.as_bytes())
        .await
        .map_err(|e| create_failed(&main_rs, e))?;

    let mut manifest = MANIFEST_HEAD.to_string();
    for line in deps {
        manifest.push_str(&line);
        manifest.push('\n');
    }
    let cargo_toml = dir.join("Cargo.toml");
    tokio::fs::write(&cargo_toml, manifest.as_bytes())
        .await
        .map_err(|e| create_failed(&cargo_toml, e))?;
    Ok(())
}

fn create_failed(path: &Path, e: std::io::Error) -> TaskError {
    TaskError::new(
        TaskErrorKind::CreateOutputFailed,
        format!("failed to create {}: {e}", path.display()),
    )
}

/// Manifest lines for every `//~` comment in `code`.
pub fn parse_dep_comments(code: &str) -> Result<Vec<String>, TaskError> {
    code.lines()
        .filter(|l| l.trim_start().starts_with("//~"))
        .map(dep_for_comment_line)
        .collect()
}

fn dep_for_comment_line(line: &str) -> Result<String, TaskError> {
    let decl = line.trim().trim_start_matches("//~").trim();
    let malformed = || {
        TaskError::new(
            TaskErrorKind::MalformedDependency,
            format!("malformed dependency declaration: `{decl}`"),
        )
    };
    let tokens: Vec<&str> = decl.split_whitespace().collect();
    match tokens.as_slice() {
        ["use", name] if is_crate_name(name) => Ok(format!("{name} = \"*\"")),
        ["use", name, "=", version] => {
            let version = version.trim_matches('"');
            if is_crate_name(name) && is_version(version) {
                Ok(format!("{name} = \"{version}\""))
            } else {
                Err(malformed())
            }
        }
        _ => Err(malformed()),
    }
}

fn is_crate_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_version(version: &str) -> bool {
    !version.is_empty() && version.chars().all(|c| c.is_ascii_digit() || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dependency_comment_forms() {
        assert_eq!(dep_for_comment_line("//~ use serde = 1.0").unwrap(), "serde = \"1.0\"");
        assert_eq!(dep_for_comment_line("  //~ use ast").unwrap(), "ast = \"*\"");
        assert_eq!(dep_for_comment_line("//~use ast").unwrap(), "ast = \"*\"");
        assert_eq!(dep_for_comment_line("//~ use ast = \"5\"").unwrap(), "ast = \"5\"");
        assert_eq!(dep_for_comment_line("//~ use ast = \"5.0.1\"").unwrap(), "ast = \"5.0.1\"");
    }

    #[test]
    fn malformed_dependencies_rejected() {
        for bad in [
            "//~ use ast = \"5a\"",
            "//~ use jsoñ = \"5\"",
            "//~ use jso.n = \"5\"",
            "//~ import serde",
            "//~",
            "//~ use ast = \"\"",
        ] {
            let err = dep_for_comment_line(bad).unwrap_err();
            assert_eq!(err.kind, TaskErrorKind::MalformedDependency, "{bad}");
        }
    }

    #[test]
    fn only_marker_lines_are_parsed() {
        let code = "//~ use rand\n// plain comment\nfn main() {}\n    //~ use itertools = \"0.14\"\n";
        assert_eq!(
            parse_dep_comments(code).unwrap(),
            vec!["rand = \"*\"".to_string(), "itertools = \"0.14\"".to_string()]
        );
    }

    #[tokio::test]
    async fn scaffold_writes_source_and_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("project");
        let code = "//~ use rand = \"0.9\"\nfn main() {}\n";
        create_cargo_scaffold(&dir, code).await.unwrap();

        let main_rs = std::fs::read_to_string(dir.join("src").join("main.rs")).unwrap();
        assert_eq!(main_rs, code);
        let manifest = std::fs::read_to_string(dir.join("Cargo.toml")).unwrap();
        assert!(manifest.contains("name = \"playground\""));
        assert!(manifest.ends_with("[dependencies]\nrand = \"0.9\"\n"));
    }

    #[tokio::test]
    async fn malformed_dependency_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("project");
        let err = create_cargo_scaffold(&dir, "//~ use bad!name\n").await.unwrap_err();
        assert_eq!(err.kind, TaskErrorKind::MalformedDependency);
        assert!(!dir.exists());
    }
}
