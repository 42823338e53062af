//! `.env` write-back for refreshed tokens.
//!
//! Only the given keys are touched; comments and unrelated entries survive.
//! Values are written double-quoted so tokens with spaces (`Bearer ...`)
//! load back through `dotenv`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

/// Load `.env` from the working directory (or a parent) into the process
/// environment. A missing file is normal and yields `None`; any other
/// problem is returned so it can be reported once logging is up.
pub fn load_default() -> Option<dotenv::Error> {
    significant(dotenv::dotenv().map(|_| ()))
}

/// Same as [`load_default`] for an explicit path.
pub fn load_path(path: impl AsRef<Path>) -> Option<dotenv::Error> {
    significant(dotenv::from_path(path.as_ref()))
}

fn significant(result: std::result::Result<(), dotenv::Error>) -> Option<dotenv::Error> {
    match result {
        Ok(()) => None,
        Err(dotenv::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => Some(e),
    }
}

/// `KEY="value"` with `\`, `"` and `$` escaped for dotenv's double quotes.
fn entry(key: &str, value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    format!("{key}=\"{quoted}\"")
}

/// Set `KEY=value` for each pair, replacing existing lines in place and
/// appending keys that are not yet present. Creates the file if missing.
pub fn upsert(path: impl AsRef<Path>, entries: &[(&str, &str)]) -> Result<()> {
    let path = path.as_ref();
    let existing = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read env file {}", path.display()))?
    } else {
        String::new()
    };

    let mut pending: Vec<(&str, &str)> = entries.to_vec();
    let mut lines: Vec<String> = Vec::new();

    for line in existing.lines() {
        let key = line
            .trim_start()
            .trim_start_matches("export ")
            .split('=')
            .next()
            .unwrap_or("")
            .trim();

        match pending.iter().position(|(k, _)| *k == key) {
            Some(idx) if line.contains('=') && !line.trim_start().starts_with('#') => {
                let (k, v) = pending.remove(idx);
                lines.push(entry(k, v));
            }
            _ => lines.push(line.to_string()),
        }
    }

    for (k, v) in pending {
        lines.push(entry(k, v));
    }

    let mut contents = lines.join("\n");
    contents.push('\n');

    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write env file {}", path.display()))?;

    debug!(path = %path.display(), keys = entries.len(), "Env file updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_env() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("certscan_env_{}", uuid::Uuid::new_v4()));
        p
    }

    #[test]
    fn test_creates_missing_file() {
        let path = temp_env();
        upsert(&path, &[("A", "1"), ("B", "2")]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A=\"1\"\nB=\"2\"\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_replaces_in_place_and_keeps_others() {
        let path = temp_env();
        std::fs::write(
            &path,
            "# tokens\nCARDLADDER_AUTHORIZATION=old\nPSA_API_TOKEN=keep\nexport CARDLADDER_APP_CHECK=stale\n",
        )
        .unwrap();

        upsert(
            &path,
            &[("CARDLADDER_AUTHORIZATION", "Bearer new"), ("CARDLADDER_APP_CHECK", "fresh")],
        )
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "# tokens\nCARDLADDER_AUTHORIZATION=\"Bearer new\"\nPSA_API_TOKEN=keep\nCARDLADDER_APP_CHECK=\"fresh\"\n"
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_commented_key_not_replaced() {
        let path = temp_env();
        std::fs::write(&path, "#PSA_API_TOKEN=disabled\n").unwrap();
        upsert(&path, &[("PSA_API_TOKEN", "live")]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "#PSA_API_TOKEN=disabled\nPSA_API_TOKEN=\"live\"\n"
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_written_values_load_back_through_dotenv() {
        let path = temp_env();
        std::fs::write(&path, "PSA_API_TOKEN=img\n").unwrap();
        let values = [
            ("CARDLADDER_AUTHORIZATION", "Bearer eyJabc.def"),
            ("CARDLADDER_APP_CHECK", r#"odd"quote\back$slash"#),
        ];
        upsert(&path, &values).unwrap();

        let loaded: Vec<(String, String)> = dotenv::from_path_iter(&path)
            .unwrap()
            .map(|item| item.unwrap())
            .collect();
        assert_eq!(
            loaded,
            vec![
                ("PSA_API_TOKEN".to_string(), "img".to_string()),
                ("CARDLADDER_AUTHORIZATION".to_string(), "Bearer eyJabc.def".to_string()),
                ("CARDLADDER_APP_CHECK".to_string(), r#"odd"quote\back$slash"#.to_string()),
            ]
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_path_missing_file_is_quiet() {
        assert!(load_path(temp_env()).is_none());
    }

    #[test]
    fn test_load_path_reports_bad_line() {
        let path = temp_env();
        std::fs::write(&path, "CERTSCAN_ENV_TEST_BAD=Bearer unquoted\n").unwrap();
        let err = load_path(&path).expect("malformed line is reported");
        assert!(matches!(err, dotenv::Error::LineParse(..)));
        std::fs::remove_file(&path).unwrap();
    }
}
