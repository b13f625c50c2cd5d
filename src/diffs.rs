use anyhow::Result;
use similar::{ChangeTag, TextDiff};

/// One line of a computed diff, tagged with how it changed.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffLine {
    pub tag: ChangeTag,
    pub text: String,
}

/// Render a unified diff between two texts.
pub fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(old_label, new_label)
        .to_string()
}

/// Line-by-line diff, keeping unchanged lines.
pub fn line_diff(old: &str, new: &str) -> Vec<DiffLine> {
    let diff = TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .map(|change| DiffLine {
            tag: change.tag(),
            text: change.value().trim_end_matches('\n').to_string(),
        })
        .collect()
}

pub fn texts_equal(a: &str, b: &str) -> bool {
    a == b
}

/// A parsed hunk of a unified patch.
#[derive(Debug, Clone)]
struct Hunk {
    old_start: usize,
    lines: Vec<(char, String)>,
}

/// Apply a unified patch (as produced by `unified_diff`) to `text`.
pub fn apply_patch(text: &str, patch: &str) -> Result<String> {
    let hunks = parse_patch(patch)?;
    let source: Vec<&str> = text.lines().collect();
    let mut result: Vec<String> = Vec::new();
    let mut cursor = 0usize;

    for hunk in hunks {
        let start = hunk.old_start.saturating_sub(1);
        if start < cursor || start > source.len() {
            anyhow::bail!("Patch hunk out of range at line {}", hunk.old_start);
        }

        result.extend(source[cursor..start].iter().map(|s| s.to_string()));
        cursor = start;

        for (marker, line) in &hunk.lines {
            match marker {
                ' ' | '-' => {
                    let current = source.get(cursor).copied().unwrap_or_default();
                    if current != line {
                        anyhow::bail!(
                            "Patch context mismatch at line {}: expected {:?}, found {:?}",
                            cursor + 1,
                            line,
                            current
                        );
                    }
                    if *marker == ' ' {
                        result.push(line.clone());
                    }
                    cursor += 1;
                }
                '+' => result.push(line.clone()),
                _ => unreachable!(),
            }
        }
    }

    result.extend(source[cursor..].iter().map(|s| s.to_string()));

    let mut out = result.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

fn parse_patch(patch: &str) -> Result<Vec<Hunk>> {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in patch.lines() {
        if line.starts_with("---") || line.starts_with("+++") {
            continue;
        }

        if let Some(header) = line.strip_prefix("@@") {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            let old_start = parse_hunk_start(header)
                .ok_or_else(|| anyhow::anyhow!("Malformed hunk header: {}", line))?;
            current = Some(Hunk {
                old_start,
                lines: Vec::new(),
            });
            continue;
        }

        if let Some(hunk) = current.as_mut() {
            let mut chars = line.chars();
            match chars.next() {
                Some(marker @ (' ' | '-' | '+')) => {
                    hunk.lines.push((marker, chars.as_str().to_string()));
                }
                Some('\\') => {} // "\ No newline at end of file"
                _ => anyhow::bail!("Malformed patch line: {:?}", line),
            }
        }
    }

    if let Some(hunk) = current.take() {
        hunks.push(hunk);
    }

    Ok(hunks)
}

// Extracts N from "@@ -N[,len] +M[,len] @@".
fn parse_hunk_start(header: &str) -> Option<usize> {
    let old = header.trim().split_whitespace().next()?;
    let old = old.strip_prefix('-')?;
    let start = old.split(',').next()?;
    start.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_diff_tags() {
        let lines = line_diff("a\nb\nc\n", "a\nx\nc\n");
        let tags: Vec<ChangeTag> = lines.iter().map(|l| l.tag).collect();
        assert_eq!(
            tags,
            vec![
                ChangeTag::Equal,
                ChangeTag::Delete,
                ChangeTag::Insert,
                ChangeTag::Equal
            ]
        );
        assert_eq!(lines[1].text, "b");
        assert_eq!(lines[2].text, "x");
    }

    #[test]
    fn test_unified_diff_round_trip() {
        let old = "fn main() {\n    println!(\"old\");\n}\n";
        let new = "fn main() {\n    println!(\"new\");\n}\n";

        let patch = unified_diff(old, new, "a/main.rs", "b/main.rs");
        assert!(patch.contains("-    println!(\"old\");"));
        assert!(patch.contains("+    println!(\"new\");"));

        let applied = apply_patch(old, &patch).unwrap();
        assert_eq!(applied, new);
    }

    #[test]
    fn test_apply_patch_context_mismatch() {
        let old = "a\nb\nc\n";
        let new = "a\nx\nc\n";
        let patch = unified_diff(old, new, "a", "b");

        let result = apply_patch("completely\ndifferent\ntext\n", &patch);
        assert!(result.is_err());
    }

    #[test]
    fn test_texts_equal() {
        assert!(texts_equal("same", "same"));
        assert!(!texts_equal("same", "other"));
    }
}
