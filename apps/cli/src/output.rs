use std::io::{self, Write};

use jl_core::{FileInfo, Rgba, RowPage};
use serde::Serialize;

use crate::cli::Format;

/// Widest a table cell gets before it is cut.
const MAX_CELL: usize = 48;

pub struct Printer {
  format: Format,
  color: bool,
}

#[derive(Serialize)]
struct JsonRow {
  number: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  highlight: Option<String>,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  search_hit: bool,
  cells: serde_json::Map<String, serde_json::Value>,
}

impl Printer {
  pub fn new(format: Format, color: bool) -> Self {
    Self { format, color }
  }

  pub fn files(&self, out: &mut impl Write, files: &[FileInfo]) -> io::Result<()> {
    for f in files {
      match self.format {
        Format::Jsonl => writeln!(out, "{}", serde_json::to_string(f).map_err(io::Error::other)?)?,
        Format::Table => {
          let tail = if f.truncated_tail { " (tail not indexed)" } else { "" };
          writeln!(out, "# {} {} entries{}", f.display_name, f.entries, tail)?;
        }
      }
    }
    Ok(())
  }

  pub fn columns(&self, out: &mut impl Write, names: &[String]) -> io::Result<()> {
    match self.format {
      Format::Jsonl => writeln!(out, "{}", serde_json::to_string(names).map_err(io::Error::other)?),
      Format::Table => {
        for n in names {
          writeln!(out, "{n}")?;
        }
        Ok(())
      }
    }
  }

  pub fn page(&self, out: &mut impl Write, page: &RowPage) -> io::Result<()> {
    match self.format {
      Format::Jsonl => self.jsonl(out, page),
      Format::Table => self.table(out, page),
    }
  }

  fn jsonl(&self, out: &mut impl Write, page: &RowPage) -> io::Result<()> {
    for row in &page.rows {
      let cells = page
        .columns
        .iter()
        .zip(&row.cells)
        .skip(1)
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
      let line = JsonRow {
        number: row.number,
        highlight: row.highlight.map(|c| c.to_hex()),
        search_hit: row.search_hit,
        cells,
      };
      writeln!(out, "{}", serde_json::to_string(&line).map_err(io::Error::other)?)?;
    }
    Ok(())
  }

  fn table(&self, out: &mut impl Write, page: &RowPage) -> io::Result<()> {
    let mut widths: Vec<usize> = page.columns.iter().map(|c| width_of(c)).collect();
    for row in &page.rows {
      for (w, cell) in widths.iter_mut().zip(&row.cells) {
        *w = (*w).max(width_of(cell));
      }
    }

    write!(out, "  ")?;
    write_cells(out, &page.columns, &widths)?;
    writeln!(out)?;
    for row in &page.rows {
      let mark = if row.search_hit { "> " } else { "  " };
      match (self.color, row.highlight) {
        (true, Some(bg)) => {
          write!(out, "{mark}{}", ansi(bg))?;
          write_cells(out, &row.cells, &widths)?;
          writeln!(out, "\x1b[0m")?;
        }
        _ => {
          write!(out, "{mark}")?;
          write_cells(out, &row.cells, &widths)?;
          writeln!(out)?;
        }
      }
    }
    if !page.reached_end {
      writeln!(out, "  ...")?;
    }
    Ok(())
  }
}

fn width_of(s: &str) -> usize {
  s.chars().count().min(MAX_CELL)
}

fn write_cells(out: &mut impl Write, cells: &[String], widths: &[usize]) -> io::Result<()> {
  let last = cells.len().saturating_sub(1);
  for (i, (cell, &w)) in cells.iter().zip(widths).enumerate() {
    let text: String = if cell.chars().count() > MAX_CELL {
      let mut t: String = cell.chars().take(MAX_CELL - 3).collect();
      t.push_str("...");
      t
    } else {
      cell.clone()
    };
    if i == last {
      write!(out, "{text}")?;
    } else {
      write!(out, "{text:<w$}  ")?;
    }
  }
  Ok(())
}

fn ansi(bg: Rgba) -> String {
  let fg = bg.contrast_text();
  format!(
    "\x1b[48;2;{};{};{}m\x1b[38;2;{};{};{}m",
    bg.r, bg.g, bg.b, fg.r, fg.g, fg.b
  )
}
