//! Markdown extractor: ATX headings and their preambles.
//!
//! A heading's extent runs from its own line to the line before the next
//! heading of the same or a higher level (or EOF). Every heading also gets
//! a `md_preamble` node covering the heading line through the line before
//! its first sub-heading; for a heading without sub-headings the preamble
//! covers the whole extent. Replacing a preamble therefore rewrites a
//! section's lead-in without touching its sub-sections.

use crate::extract::{Extract, ExtractError};
use crate::node::Node;

pub struct MarkdownExtractor;

struct Heading {
    name: String,
    level: usize,
    start_line: usize,
    end_line: usize,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl Extract for MarkdownExtractor {
    fn extract(&self, path: &str, content: &str) -> Result<Vec<Node>, ExtractError> {
        let lines: Vec<&str> = content.lines().collect();
        let mut headings = scan_headings(&lines);
        compute_extents(&mut headings, lines.len());
        build_hierarchy(&mut headings);

        let offsets = line_offsets(content);
        let mut nodes = Vec::with_capacity(headings.len() * 2);
        let heading_nodes: Vec<Node> = headings
            .iter()
            .map(|h| {
                Node::new("md_heading", &h.name, path, h.start_line, h.end_line)
                    .with_bytes(offsets[h.start_line - 1], offsets[h.end_line])
                    .with_meta("level", h.level.to_string())
            })
            .collect();

        for (i, heading) in headings.iter().enumerate() {
            let mut node = heading_nodes[i].clone();
            node.parent_id = heading.parent.map(|p| heading_nodes[p].id.clone());
            node.children_ids = heading
                .children
                .iter()
                .map(|&c| heading_nodes[c].id.clone())
                .collect();

            let preamble_end = heading
                .children
                .first()
                .map(|&c| headings[c].start_line - 1)
                .unwrap_or(heading.end_line);
            let mut preamble =
                Node::new("md_preamble", &heading.name, path, heading.start_line, preamble_end)
                    .with_bytes(offsets[heading.start_line - 1], offsets[preamble_end])
                    .with_meta("level", heading.level.to_string());
            preamble.parent_id = Some(node.id.clone());

            nodes.push(node);
            nodes.push(preamble);
        }

        Ok(nodes)
    }
}

/// Find every ATX heading outside code fences.
fn scan_headings(lines: &[&str]) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut in_fence = false;
    let mut fence_char = '`';

    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if stripped.starts_with("```") || stripped.starts_with("~~~") {
            let delimiter = if stripped.starts_with('`') { '`' } else { '~' };
            if !in_fence {
                in_fence = true;
                fence_char = delimiter;
            } else if delimiter == fence_char {
                in_fence = false;
            }
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some((level, name)) = parse_atx(line) {
            headings.push(Heading {
                name,
                level,
                start_line: i + 1,
                end_line: i + 1,
                parent: None,
                children: Vec::new(),
            });
        }
    }
    headings
}

/// Parse one line as an ATX heading: 1-6 `#` followed by whitespace (or
/// nothing), closing hashes stripped. Empty titles are not headings.
fn parse_atx(line: &str) -> Option<(usize, String)> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let name = rest.trim().trim_end_matches('#').trim();
    if name.is_empty() {
        return None;
    }
    Some((level, name.to_string()))
}

/// Extent of each heading: up to the line before the next heading of the
/// same or a higher level, or EOF.
fn compute_extents(headings: &mut [Heading], total_lines: usize) {
    for i in 0..headings.len() {
        let boundary = headings[i + 1..]
            .iter()
            .find(|next| next.level <= headings[i].level)
            .map(|next| next.start_line - 1);
        headings[i].end_line = boundary.unwrap_or(total_lines);
    }
}

/// Parent = nearest preceding heading with a lower level.
fn build_hierarchy(headings: &mut [Heading]) {
    for i in 0..headings.len() {
        let parent = (0..i)
            .rev()
            .find(|&j| headings[j].level < headings[i].level);
        headings[i].parent = parent;
        if let Some(p) = parent {
            headings[p].children.push(i);
        }
    }
}

/// Byte offset of each line start, with a final sentinel at content end.
fn line_offsets(content: &str) -> Vec<usize> {
    let mut offsets = vec![0];
    let mut total = 0;
    for line in content.split_inclusive('\n') {
        total += line.len();
        offsets.push(total);
    }
    if offsets.len() == 1 {
        offsets.push(0);
    }
    offsets
}
