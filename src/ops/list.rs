//! Implementation of `portable-python list`.

use crate::core::version::Family;

/// Tracked versions of each of `families` (all of them when empty), one per line.
///
/// With more than one family, each gets a `family:` header and indented versions.
pub fn list_versions(families: &[String]) -> String {
    let families: Vec<String> = if families.is_empty() {
        Family::ALL.iter().map(|f| f.to_string()).collect()
    } else {
        families.to_vec()
    };
    let indent = if families.len() == 1 { "" } else { "  " };

    let mut sections = Vec::with_capacity(families.len());
    for name in &families {
        let mut lines = Vec::new();
        if !indent.is_empty() {
            lines.push(format!("{}:", name));
        }
        match name.parse::<Family>() {
            Ok(family) => {
                lines.extend(family.versions().iter().map(|v| format!("{}{}", indent, v)));
            }
            Err(_) => lines.push(format!("{}not supported", indent)),
        }
        sections.push(lines.join("\n"));
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_family() {
        let text = list_versions(&[]);
        assert!(text.starts_with("3.9.6\n3.9.5\n"));
        assert!(!text.contains(':'));
    }

    #[test]
    fn test_several_families() {
        let text = list_versions(&["conda".to_string(), "cpython".to_string()]);
        assert!(text.starts_with("conda:\n  not supported\n\ncpython:\n  3.9.6\n"));
    }
}
