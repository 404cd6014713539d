//! CLI output formatting.
//!
//! The `check` command prints an inventory of the image catalog: one entry
//! per base image with its cache status as an indented context line, then a
//! summary of the configured board.
//!
//! ```text
//! Images (img)
//! 001 beach.jpg
//!     Status: cached → squared/beach_square.jpg
//! 002 dawn.png
//!     Status: square (800x800)
//! 003 harbor.jpg
//!     Status: needs crop (1200x800)
//!
//! Board
//!     Grid: 2x2 (2 pairs)
//!     Catalog: 3 images, 1 cached, 1 needs crop
//! ```
//!
//! Format functions return `Vec<String>` and do no I/O; `print_*` wrappers
//! write to stdout.

use crate::config::BoardSize;
use crate::normalizer::{ImageStatus, derivative_display_name};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn status_line(name: &str, status: &ImageStatus) -> String {
    match status {
        ImageStatus::Cached => format!("    Status: cached → {}", derivative_display_name(name)),
        ImageStatus::Square(d) => format!("    Status: square ({}x{})", d.width, d.height),
        ImageStatus::NeedsCrop(d) => format!("    Status: needs crop ({}x{})", d.width, d.height),
        ImageStatus::Unreadable(reason) => format!("    Status: unreadable ({reason})"),
    }
}

/// Format the catalog inventory and board summary.
pub fn format_check_output(
    image_root: &Path,
    inventory: &[(String, ImageStatus)],
    grid: &str,
    board: BoardSize,
) -> Vec<String> {
    let mut lines = vec![format!("Images ({})", image_root.display())];
    if inventory.is_empty() {
        lines.push("    (none)".to_string());
    }
    for (i, (name, status)) in inventory.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), name));
        lines.push(status_line(name, status));
    }

    let cached = inventory
        .iter()
        .filter(|(_, s)| *s == ImageStatus::Cached)
        .count();
    let needs_crop = inventory
        .iter()
        .filter(|(_, s)| matches!(s, ImageStatus::NeedsCrop(_)))
        .count();
    let unreadable = inventory
        .iter()
        .filter(|(_, s)| matches!(s, ImageStatus::Unreadable(_)))
        .count();

    lines.push(String::new());
    lines.push("Board".to_string());
    lines.push(format!("    Grid: {grid} ({} pairs)", board.pairs()));
    let mut catalog = format!(
        "    Catalog: {} images, {cached} cached, {needs_crop} needs crop",
        inventory.len()
    );
    if unreadable > 0 {
        catalog.push_str(&format!(", {unreadable} unreadable"));
    }
    lines.push(catalog);
    if inventory.len() < board.pairs() {
        lines.push(format!(
            "    Note: board shrinks to {} pairs",
            inventory.len()
        ));
    }
    lines
}

pub fn print_check_output(
    image_root: &Path,
    inventory: &[(String, ImageStatus)],
    grid: &str,
    board: BoardSize,
) {
    for line in format_check_output(image_root, inventory, grid, board) {
        println!("{}", line);
    }
}
