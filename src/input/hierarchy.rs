//! ICD-10 hierarchy parser.
//!
//! The taxonomy XML nests `chapter`, `section`, and up to five
//! levels of `diag` elements. Flattening walks to the leaves and
//! records, for every full-resolution code, its label and the labels
//! of its ancestors; the codebook later collapses these at the
//! configured level.

use std::fs;
use std::path::Path;

use log::info;
use serde::Deserialize;

use crate::error::{Result, ResultExt};
use crate::models::codebook::CodeEntry;

#[derive(Debug, Deserialize)]
struct Tabular {
    #[serde(rename = "chapter", default)]
    chapters: Vec<Chapter>,
}

#[derive(Debug, Deserialize)]
struct Chapter {
    desc: String,
    #[serde(rename = "section", default)]
    sections: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    desc: String,
    #[serde(rename = "diag", default)]
    diagnoses: Vec<Diag>,
}

#[derive(Debug, Deserialize)]
struct Diag {
    name: String,
    desc: String,
    #[serde(rename = "diag", default)]
    children: Vec<Diag>,
}

/// Parse the hierarchy into full-resolution `(code, entry)` pairs.
///
/// # Errors
/// Fails when the file cannot be read or is not well-formed XML.
pub fn parse_hierarchy(path: &Path) -> Result<Vec<(String, CodeEntry)>> {
    info!("Parsing diagnosis code hierarchy from {}", path.display());
    let text = fs::read_to_string(path).with_path_context("cannot read code hierarchy", path)?;
    let tabular: Tabular = quick_xml::de::from_str(&text)
        .with_path_context("cannot parse code hierarchy XML", path)?;

    let mut codes = Vec::new();
    for chapter in &tabular.chapters {
        for section in &chapter.sections {
            let mut ancestors = vec![chapter.desc.clone(), section.desc.clone()];
            for diag in &section.diagnoses {
                walk(diag, &mut ancestors, &mut codes);
            }
        }
    }
    info!("Parsed {} full-resolution codes", codes.len());
    Ok(codes)
}

fn walk(diag: &Diag, ancestors: &mut Vec<String>, out: &mut Vec<(String, CodeEntry)>) {
    if diag.children.is_empty() {
        out.push((
            diag.name.clone(),
            CodeEntry {
                label: diag.desc.clone(),
                categories: ancestors.clone(),
                level: ancestors.len(),
            },
        ));
        return;
    }
    ancestors.push(diag.desc.clone());
    for child in &diag.children {
        walk(child, ancestors, out);
    }
    ancestors.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<ICD10CM.tabular>
  <chapter>
    <desc>Certain infectious and parasitic diseases (A00-B99)</desc>
    <section id="A00-A09">
      <desc>Intestinal infectious diseases (A00-A09)</desc>
      <diag>
        <name>A00</name>
        <desc>Cholera</desc>
        <diag>
          <name>A00.0</name>
          <desc>Cholera due to Vibrio cholerae 01, biovar cholerae</desc>
        </diag>
        <diag>
          <name>A00.1</name>
          <desc>Cholera due to Vibrio cholerae 01, biovar eltor</desc>
        </diag>
      </diag>
      <diag>
        <name>A02</name>
        <desc>Other salmonella infections</desc>
      </diag>
    </section>
  </chapter>
</ICD10CM.tabular>
"#;

    fn sample_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file
    }

    #[test]
    fn leaves_carry_their_ancestry() {
        let file = sample_file();
        let codes = parse_hierarchy(file.path()).unwrap();
        assert_eq!(codes.len(), 3);

        let (code, entry) = codes.iter().find(|(c, _)| c == "A00.0").unwrap();
        assert_eq!(code, "A00.0");
        assert_eq!(entry.level, 3);
        assert_eq!(
            entry.categories,
            vec![
                "Certain infectious and parasitic diseases (A00-B99)".to_string(),
                "Intestinal infectious diseases (A00-A09)".to_string(),
                "Cholera".to_string(),
            ]
        );

        let (_, a02) = codes.iter().find(|(c, _)| c == "A02").unwrap();
        assert_eq!(a02.level, 2);
        assert_eq!(a02.categories.len(), 2);
    }

    #[test]
    fn inner_nodes_with_children_are_not_leaves() {
        let file = sample_file();
        let codes = parse_hierarchy(file.path()).unwrap();
        assert!(codes.iter().all(|(c, _)| c != "A00"));
    }
}
