//! Top-level-key segmentation for YAML and TOML files

use super::segment::{Segment, Split};
use super::{joined_len, trimmed_len, ChunkKind, ConfigFormat};
use crate::config::ChunkingConfig;
use once_cell::sync::Lazy;
use regex::Regex;

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex literal {pattern}: {err}"))
}

// Unindented, not a comment, not a list item or document marker
static YAML_KEY: Lazy<Regex> =
    Lazy::new(|| compile_regex(r"^(?P<key>[^\s#\-][^:#]*?)\s*:(?:\s|$)"));
static TOML_TABLE: Lazy<Regex> =
    Lazy::new(|| compile_regex(r"^\[\[?\s*(?P<key>[^\]]+?)\s*\]\]?\s*(?:#.*)?$"));
static TOML_KEY: Lazy<Regex> =
    Lazy::new(|| compile_regex(r#"^(?P<key>[A-Za-z0-9_\-."']+)\s*="#));

/// Line index and key of every section start
fn section_starts(format: ConfigFormat, lines: &[&str]) -> Vec<(usize, String)> {
    let mut starts = Vec::new();
    let mut in_table = false;

    for (index, line) in lines.iter().enumerate() {
        let key = match format {
            ConfigFormat::Yaml => YAML_KEY.captures(line).map(|caps| caps["key"].to_string()),
            ConfigFormat::Toml => {
                if let Some(caps) = TOML_TABLE.captures(line) {
                    in_table = true;
                    Some(caps["key"].to_string())
                } else if !in_table {
                    TOML_KEY.captures(line).map(|caps| caps["key"].to_string())
                } else {
                    None
                }
            }
        };

        if let Some(key) = key {
            starts.push((index, key.trim_matches(|c| c == '"' || c == '\'').to_string()));
        }
    }

    starts
}

/// Segment a config file into one section per top-level key
///
/// Lines before the first key belong to the first section.
pub(super) fn segments(
    format: ConfigFormat,
    lines: &[&str],
    config: &ChunkingConfig,
) -> Vec<Segment> {
    let starts = section_starts(format, lines);
    let mut segments = Vec::new();

    for (position, (line, key)) in starts.iter().enumerate() {
        let start = if position == 0 { 0 } else { *line };
        let end = starts
            .get(position + 1)
            .map(|(next, _)| *next)
            .unwrap_or(lines.len());

        if trimmed_len(lines, start, end) < config.min_config_chars {
            tracing::trace!("Dropping short config section '{}'", key);
            continue;
        }

        let split = if joined_len(lines, start, end) > config.config_section_max_chars {
            Split::Windows {
                lines: config.config_split_lines,
                overlap: config.config_overlap_lines,
            }
        } else {
            Split::Lines
        };

        segments.push(Segment {
            start,
            end,
            name: Some(key.clone()),
            kind: ChunkKind::ConfigSection,
            split,
        });
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{Chunker, Document};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_yaml_sections() {
        let text = "\
# Application settings
---
database:
  adapter: postgresql
  pool: 25
  host: db.internal.example.com
version: 3
mailer:
  delivery_method: smtp
  smtp_settings:
    address: smtp.example.com
  # - not a key
";
        let chunks =
            Chunker::new(ChunkingConfig::default()).chunk(&Document::new("config/app.yml", text));

        let names: Vec<Option<&str>> = chunks.iter().map(|c| c.name.as_deref()).collect();
        assert_eq!(names, vec![Some("database"), Some("mailer")]);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 6));
        assert_eq!(chunks[1].start_line, 8);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::ConfigSection));
    }

    #[test]
    fn test_toml_tables_and_top_level_keys() {
        let text = "\
title = \"billing service configuration file\"

[server]
host = \"0.0.0.0\"
port = 8080
workers = 16

[[jobs]]
name = \"nightly-reconciliation\"
";
        let lines: Vec<&str> = text.lines().collect();
        let keys: Vec<String> = section_starts(ConfigFormat::Toml, &lines)
            .into_iter()
            .map(|(_, key)| key)
            .collect();
        assert_eq!(keys, vec!["title", "server", "jobs"]);
    }

    #[test]
    fn test_large_section_split_with_overlap() {
        let config = ChunkingConfig {
            config_section_max_chars: 200,
            config_split_lines: 10,
            config_overlap_lines: 2,
            ..ChunkingConfig::default()
        };
        let mut text = String::from("locales:\n");
        for i in 0..25 {
            text.push_str(&format!("  key_{:02}: translated value {:02}\n", i, i));
        }

        let chunks = Chunker::new(config).chunk(&Document::new("config/locales.yml", text));
        let spans: Vec<(usize, usize)> =
            chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
        assert_eq!(spans, vec![(1, 10), (9, 18), (17, 26)]);

        let names: Vec<&str> = chunks.iter().filter_map(|c| c.name.as_deref()).collect();
        assert_eq!(names, vec!["locales_part_1", "locales_part_2", "locales_part_3"]);
    }

    #[test]
    fn test_no_sections_falls_back_to_windows() {
        let text = "- just\n- a\n- list of items that is long enough\n";
        let chunks =
            Chunker::new(ChunkingConfig::default()).chunk(&Document::new("list.yaml", text));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Generic);
    }
}
