use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use phylotree::tree::Tree as PhyloTree;

use crate::error::KnclError;
use crate::kncl::PairCompletion;
use crate::tree::Tree;

/// Characters that force a label to be single-quoted on output.
const NEWICK_METACHARS: &[char] = &['(', ')', '[', ']', '\'', ':', ';', ',', ' ', '\t'];

/// Strip bracketed comments from Newick strings.
///
/// Covers plain `[comment]` blocks as well as BEAST style annotations like
/// `:[&rate=0.123]2.45`, where `2.45` is the actual branch length. Brackets inside
/// quoted labels are left alone.
fn strip_comments(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut depth = 0usize;
    let mut in_quote = false;

    for ch in newick.chars() {
        match ch {
            '\'' if depth == 0 => {
                in_quote = !in_quote;
                result.push(ch);
            }
            '[' if !in_quote => depth += 1,
            ']' if !in_quote && depth > 0 => depth -= 1,
            _ if depth == 0 => result.push(ch),
            _ => {}
        }
    }

    result
}

/// Rewrite single-quoted labels with the double quotes `phylotree` reads.
///
/// A doubled `''` inside a label stands for one literal quote.
fn requote_labels(newick: &str) -> Result<String, KnclError> {
    let mut result = String::with_capacity(newick.len());
    let mut chars = newick.chars().peekable();
    let mut in_quote = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\'' if in_quote && chars.peek() == Some(&'\'') => {
                chars.next();
                result.push('\'');
            }
            '\'' => {
                in_quote = !in_quote;
                result.push('"');
            }
            '"' if in_quote => {
                return Err(KnclError::Newick(
                    "double quote inside a single-quoted label".to_string(),
                ));
            }
            _ => result.push(ch),
        }
    }
    if in_quote {
        return Err(KnclError::Newick("unterminated quoted label".to_string()));
    }

    Ok(result)
}

fn unquote(name: &str) -> String {
    match name.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.to_string(),
        None => name.to_string(),
    }
}

/// Parse one Newick string into a [`Tree`].
///
/// Parsing is delegated to `phylotree`; the result is copied into the arena
/// model. Internal labels (names or support values) are dropped, missing branch
/// lengths become `0`, and leaves must carry unique names. Quoted labels keep
/// their blanks and metacharacters.
pub fn parse_newick(newick: &str) -> Result<Tree, KnclError> {
    let cleaned = requote_labels(&strip_comments(newick.trim()))?;
    let phylo = PhyloTree::from_newick(&cleaned).map_err(|e| KnclError::Newick(e.to_string()))?;

    let phylo_root = phylo.get_root()?;
    let mut tree = Tree::new();
    let root = tree.root();

    let root_node = phylo.get(&phylo_root)?;
    if root_node.children.is_empty() {
        tree.node_mut(root).name = root_node.name.as_deref().map(unquote);
    }

    let mut stack = vec![(phylo_root, root)];
    while let Some((src, dst)) = stack.pop() {
        let node = phylo.get(&src)?;
        for &child_id in &node.children {
            let child = phylo.get(&child_id)?;
            let name = if child.children.is_empty() {
                child.name.as_deref().map(unquote)
            } else {
                None
            };
            let length = child.parent_edge.unwrap_or(0.0);
            if length < 0.0 {
                return Err(KnclError::InvalidTree(format!(
                    "negative branch length {length}"
                )));
            }
            let id = tree.add_child(dst, name, length);
            stack.push((child_id, id));
        }
    }

    tree.validate()?;
    Ok(tree)
}

/// Quote a label if it contains Newick metacharacters.
fn escape_label(label: &str) -> String {
    if label.contains(NEWICK_METACHARS) {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}

/// Shortest round-trip decimal form; `-0` is printed as `0`.
fn format_length(length: f64) -> String {
    if length == 0.0 { "0".to_string() } else { format!("{length}") }
}

/// Serialize a tree to Newick with a closing semicolon.
///
/// Children are written in stored order and every non-root node carries its
/// branch length, so identical trees always produce identical strings.
///
/// # Example
/// ```
/// # use kncl_tree_completion::io::{parse_newick, to_newick};
/// let tree = parse_newick("(A:1,(B:1,C:0.5):1);").unwrap();
/// assert_eq!(to_newick(&tree), "(A:1,(B:1,C:0.5):1);");
/// ```
pub fn to_newick(tree: &Tree) -> String {
    let mut out = String::new();
    let root = tree.root();
    let mut stack = vec![(root, 0usize)];

    while let Some((id, next)) = stack.pop() {
        let node = tree.node(id);

        if node.is_leaf() {
            if let Some(name) = &node.name {
                out.push_str(&escape_label(name));
            }
            if id != root {
                out.push(':');
                out.push_str(&format_length(node.dist));
            }
            continue;
        }

        if next == 0 {
            out.push('(');
        }
        if next < node.children.len() {
            if next > 0 {
                out.push(',');
            }
            stack.push((id, next + 1));
            stack.push((node.children[next], 0));
        } else {
            out.push(')');
            if let Some(name) = node.name.as_deref().filter(|n| !n.is_empty()) {
                out.push_str(&escape_label(name));
            }
            if id != root {
                out.push(':');
                out.push_str(&format_length(node.dist));
            }
        }
    }

    out.push(';');
    out
}

/// Read every tree of a Newick file, one tree per non-empty line.
/// Files ending in `.gz` are decompressed on the fly.
pub fn read_newick_file<P: AsRef<Path>>(path: P) -> Result<Vec<Tree>, KnclError> {
    let p = path.as_ref();
    let content = if p.to_string_lossy().ends_with(".gz") {
        let mut decoder = GzDecoder::new(File::open(p)?);
        let mut s = String::new();
        decoder.read_to_string(&mut s)?;
        s
    } else {
        fs::read_to_string(p)?
    };

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            parse_newick(line).map_err(|e| match e {
                KnclError::Newick(msg) => KnclError::Newick(format!("line {}: {msg}", idx + 1)),
                KnclError::InvalidTree(msg) => {
                    KnclError::InvalidTree(format!("line {}: {msg}", idx + 1))
                }
                other => other,
            })
        })
        .collect()
}

/// Render the result block of one tree pair (1-based indices).
pub fn format_pair_block(
    i: usize,
    j: usize,
    outcome: &Result<PairCompletion, KnclError>,
) -> String {
    match outcome {
        Ok(pair) => format!(
            "Tree pair {i} and {j}:\nBSD(+): {}\nBSD(-): {}\nCompleted Tree 1:\n{}\nCompleted Tree 2:\n{}\n",
            pair.bsd_plus,
            pair.bsd_minus,
            to_newick(&pair.completion.t1),
            to_newick(&pair.completion.t2),
        ),
        Err(e) => format!("Tree pair {i} and {j}: tree completion failed: {e}\n"),
    }
}

/// Write result blocks to a file or stdout.
/// If `path` ends with `.gz`, the output is gzip-compressed.
/// If `path` equals `-`, the blocks are written to stdout (uncompressed).
pub fn write_blocks<P: AsRef<Path>>(path: P, blocks: &[String]) -> io::Result<()> {
    let p = path.as_ref();

    let mut out: Box<dyn Write> = if p.as_os_str() == "-" {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else if p.to_string_lossy().ends_with(".gz") {
        let f = File::create(p)?;
        let enc = GzEncoder::new(f, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    for block in blocks {
        out.write_all(block.as_bytes())?;
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comments() {
        assert_eq!(strip_comments("(A:[&rate=0.1]1,B:2)[root];"), "(A:1,B:2);");
        assert_eq!(strip_comments("('a[1]':1,B:2);"), "('a[1]':1,B:2);");
    }

    #[test]
    fn test_requote_labels() {
        assert_eq!(requote_labels("('a b':1,B:2);").unwrap(), "(\"a b\":1,B:2);");
        assert_eq!(requote_labels("('it''s':1,B:2);").unwrap(), "(\"it's\":1,B:2);");
        assert!(requote_labels("('a:1,B:2);").is_err());
        assert!(requote_labels("('a\"b':1,B:2);").is_err());
    }

    #[test]
    fn test_quoted_labels_round_trip() {
        for newick in ["('Homo sapiens':1,B:2);", "('it''s':1,('a,b':0.5,C:1):1);"] {
            let tree = parse_newick(newick).unwrap();
            assert_eq!(to_newick(&tree), newick);
        }
        let tree = parse_newick("('Homo sapiens':1,B:2);").unwrap();
        assert!(tree.find_leaf("Homo sapiens").is_some());
    }

    #[test]
    fn test_parse_drops_internal_labels() {
        let tree = parse_newick("((A:1,B:2)0.95:0.5,C:3);").unwrap();
        assert_eq!(to_newick(&tree), "((A:1,B:2):0.5,C:3);");
        assert!(tree.preorder().iter().all(|&id| {
            let node = tree.node(id);
            node.is_leaf() || node.name.is_none()
        }));
    }

    #[test]
    fn test_missing_lengths_default_to_zero() {
        let tree = parse_newick("(A,(B,C));").unwrap();
        assert_eq!(to_newick(&tree), "(A:0,(B:0,C:0):0);");
    }

    #[test]
    fn test_rejects_duplicate_leaves() {
        assert!(matches!(
            parse_newick("(A:1,A:1);"),
            Err(KnclError::InvalidTree(_))
        ));
    }

    #[test]
    fn test_escape_label() {
        assert_eq!(escape_label("Homo_sapiens"), "Homo_sapiens");
        assert_eq!(escape_label("Homo sapiens"), "'Homo sapiens'");
        assert_eq!(escape_label("it's"), "'it''s'");
    }

    #[test]
    fn test_format_length() {
        assert_eq!(format_length(1.0), "1");
        assert_eq!(format_length(0.25), "0.25");
        assert_eq!(format_length(-0.0), "0");
    }
}
