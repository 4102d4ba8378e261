use std::io::Write;
use std::path::Path;

/// Emit a rendered summary: to `output_path` when given, else to stdout
/// with a trailing newline.
pub fn write_output(text: &str, output_path: Option<&str>) -> Result<(), String> {
    if let Some(path) = output_path {
        return std::fs::write(Path::new(path), text)
            .map_err(|e| format!("Failed to write output file '{}': {}", path, e));
    }
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text).map_err(|e| format!("Failed to write to stdout: {}", e))
}

/// Render a watch, decode or config summary as JSON.
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    let rendered = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    rendered.map_err(|e| format!("JSON serialization failed: {}", e))
}

pub fn print_json<T: serde::Serialize>(
    value: &T,
    compact: bool,
    output_path: Option<&str>,
) -> Result<(), String> {
    write_output(&to_json(value, compact)?, output_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_json_has_no_newlines() {
        let value = serde_json::json!({ "channels": [0, 1], "depth": 50 });
        assert!(!to_json(&value, true).unwrap().contains('\n'));
        assert!(to_json(&value, false).unwrap().contains('\n'));
    }

    #[test]
    fn test_summary_written_to_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().display().to_string();
        write_output("{\"depth\": 2}", Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"depth\": 2}");
    }
}
