//! Positioned text recovery from page content streams.
//!
//! Walks the text operators of a page and records each shown string with its
//! user-space origin, then groups runs into lines and lines into cells. Glyph
//! widths are estimated from the font size since font programs are not read.

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId, StringFormat};
use tracing::trace;

use crate::error::PdfError;

/// Average glyph advance as a fraction of the font size.
const GLYPH_WIDTH_EM: f32 = 0.5;

/// Kerning adjustment (thousandths of an em) rendered as a space inside `TJ`.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// Horizontal gap, in multiples of the font size, that starts a new cell.
const CELL_GAP_EM: f32 = 1.0;

/// A string shown on the page at a known position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    /// Estimated advance width.
    pub width: f32,
    pub font_size: f32,
    pub text: String,
}

impl TextRun {
    pub fn end_x(&self) -> f32 {
        self.x + self.width
    }
}

/// Runs sharing a baseline, split into cells on wide gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub y: f32,
    pub cells: Vec<String>,
}

impl TextLine {
    /// Cells joined with a column break, for line-oriented parsing.
    pub fn to_text(&self) -> String {
        self.cells.join("  ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translation(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other`, row-vector convention.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }
}

#[derive(Debug, Clone)]
struct TextState {
    ctm: Matrix,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
        }
    }
}

struct Walker {
    state: TextState,
    saved: Vec<TextState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    runs: Vec<TextRun>,
}

impl Walker {
    fn new() -> Self {
        Self {
            state: TextState::default(),
            saved: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            runs: Vec::new(),
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translation(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_line(0.0, -leading);
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = Matrix::translation(tx, 0.0).then(&self.text_matrix);
    }

    fn glyph_advance(&self, ch: char) -> f32 {
        let spacing = if ch == ' ' {
            self.state.char_spacing + self.state.word_spacing
        } else {
            self.state.char_spacing
        };
        (GLYPH_WIDTH_EM * self.state.font_size + spacing) * self.state.horizontal_scale
    }

    fn show(&mut self, pieces: &[Object]) {
        let origin = self.text_matrix.then(&self.state.ctm);
        let mut text = String::new();

        for piece in pieces {
            match piece {
                Object::String(bytes, format) => {
                    for ch in decode_pdf_string(bytes, format).chars() {
                        let tx = self.glyph_advance(ch);
                        self.advance(tx);
                        text.push(ch);
                    }
                }
                other => {
                    if let Some(adjust) = number(other) {
                        let tx = -adjust / 1000.0 * self.state.font_size * self.state.horizontal_scale;
                        self.advance(tx);
                        if adjust < TJ_SPACE_THRESHOLD && !text.ends_with(' ') {
                            text.push(' ');
                        }
                    }
                }
            }
        }

        let end = self.text_matrix.then(&self.state.ctm);
        let text = text.trim().to_string();
        if text.is_empty() || !is_mostly_printable(&text) {
            return;
        }

        let [_, _, c, d, x, y] = origin.0;
        let scale = (c * c + d * d).sqrt();
        self.runs.push(TextRun {
            x,
            y,
            width: (end.0[4] - x).abs(),
            font_size: self.state.font_size * if scale > 0.0 { scale } else { 1.0 },
            text,
        });
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        let num = |i: usize| operands.get(i).and_then(number);

        match operator {
            "q" => self.saved.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.saved.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let Some(m) = matrix(operands) {
                    self.state.ctm = m.then(&self.state.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(size) = num(1) {
                    self.state.font_size = size;
                }
            }
            "Tc" => self.state.char_spacing = num(0).unwrap_or(0.0),
            "Tw" => self.state.word_spacing = num(0).unwrap_or(0.0),
            "Tz" => self.state.horizontal_scale = num(0).unwrap_or(100.0) / 100.0,
            "TL" => self.state.leading = num(0).unwrap_or(0.0),
            "Td" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.state.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = matrix(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => self.show(operands),
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    self.show(items);
                }
            }
            "'" => {
                self.next_line();
                self.show(operands);
            }
            "\"" => {
                self.state.word_spacing = num(0).unwrap_or(0.0);
                self.state.char_spacing = num(1).unwrap_or(0.0);
                self.next_line();
                self.show(operands.get(2..).unwrap_or(&[]));
            }
            _ => {}
        }
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn matrix(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut values = [0.0f32; 6];
    for (slot, obj) in values.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    Some(Matrix(values))
}

/// Decode a string operand: UTF-16BE when it carries a BOM, Latin-1 otherwise.
fn decode_pdf_string(bytes: &[u8], _format: &StringFormat) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Two-byte glyph encodings decode to control characters; such runs are skipped.
fn is_mostly_printable(text: &str) -> bool {
    let total = text.chars().count();
    let printable = text.chars().filter(|c| !c.is_control()).count();
    printable * 10 >= total * 7
}

/// Positioned text runs of one page.
pub fn page_runs(doc: &Document, page_id: ObjectId) -> Result<Vec<TextRun>, PdfError> {
    let data = doc
        .get_page_content(page_id)
        .map_err(|e| PdfError::TextExtraction(e.to_string()))?;
    let content = Content::decode(&data).map_err(|e| PdfError::TextExtraction(e.to_string()))?;

    let mut walker = Walker::new();
    for op in &content.operations {
        walker.apply(&op.operator, &op.operands);
    }

    trace!(runs = walker.runs.len(), "content stream walked");
    Ok(walker.runs)
}

/// Group runs into lines top to bottom, splitting cells on gaps wider than an em.
pub fn group_lines(runs: &[TextRun], line_tolerance: f32) -> Vec<TextLine> {
    let mut sorted: Vec<&TextRun> = runs.iter().collect();
    sorted.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut rows: Vec<(f32, Vec<&TextRun>)> = Vec::new();
    for run in sorted {
        match rows.last_mut() {
            Some((y, members)) if (*y - run.y).abs() <= line_tolerance => members.push(run),
            _ => rows.push((run.y, vec![run])),
        }
    }

    rows.into_iter()
        .map(|(y, mut members)| {
            members.sort_by(|a, b| a.x.total_cmp(&b.x));
            TextLine {
                y,
                cells: split_cells(&members),
            }
        })
        .collect()
}

fn split_cells(runs: &[&TextRun]) -> Vec<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut last_end: Option<f32> = None;

    for run in runs {
        let gap = last_end.map(|end| run.x - end);
        match (gap, cells.last_mut()) {
            (Some(gap), Some(cell)) if gap <= CELL_GAP_EM * run.font_size => {
                if gap > 0.15 * run.font_size {
                    cell.push(' ');
                }
                cell.push_str(&run.text);
            }
            _ => cells.push(run.text.clone()),
        }
        last_end = Some(last_end.map_or(run.end_x(), |end| end.max(run.end_x())));
    }
    cells
}

/// Split runs at the page's vertical midline.
pub fn split_halves(runs: Vec<TextRun>, page_width: f32) -> (Vec<TextRun>, Vec<TextRun>) {
    let mid = page_width / 2.0;
    runs.into_iter().partition(|r| r.x < mid)
}

/// Rows of a table-shaped region, or `None` when the lines do not look tabular.
///
/// Tabular means at least two lines carry three or more cells. A leading row
/// without any digit is treated as a header.
pub fn table_rows(lines: &[TextLine]) -> Option<Vec<Vec<String>>> {
    let wide = lines.iter().filter(|l| l.cells.len() >= 3).count();
    if wide < 2 {
        return None;
    }

    let mut rows: Vec<Vec<String>> = lines
        .iter()
        .filter(|l| l.cells.len() >= 2)
        .map(|l| l.cells.clone())
        .collect();

    if rows
        .first()
        .is_some_and(|r| !r.iter().any(|c| c.chars().any(|ch| ch.is_ascii_digit())))
    {
        rows.remove(0);
    }
    Some(rows)
}
